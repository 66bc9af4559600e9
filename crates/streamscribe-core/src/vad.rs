//! Voice activity detection by RMS threshold (spec §4.2).
//!
//! Edge-triggered: emits one event per phrase boundary, not per frame.

use crate::ring::SAMPLE_RATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// RMS crossed above threshold after a run of silence.
    SpeechDetected,
    /// `silence_hold_sec` elapsed with RMS at or below threshold.
    SilenceDetected,
}

pub struct Vad {
    threshold: f64,
    silence_hold_sec: f64,
    in_silence: bool,
    /// Stream time the current silence run started, if any.
    silence_since: Option<f64>,
    /// Set once the silence-hold timer has already fired for this run,
    /// so it emits at most once per silence run.
    silence_timer_fired: bool,
}

impl Vad {
    pub fn new(threshold: f64, silence_hold_sec: f64) -> Self {
        Self {
            threshold,
            silence_hold_sec,
            in_silence: true,
            silence_since: None,
            silence_timer_fired: false,
        }
    }

    pub fn in_silence(&self) -> bool {
        self.in_silence
    }

    /// RMS of a whole 16-bit little-endian mono PCM frame, normalized to [0, 1].
    pub fn rms(frame: &[u8]) -> f64 {
        if frame.len() < 2 {
            return 0.0;
        }
        let mut sum_sq = 0f64;
        let mut n = 0usize;
        for chunk in frame.chunks_exact(2) {
            let s = i16::from_le_bytes([chunk[0], chunk[1]]) as f64;
            sum_sq += s * s;
            n += 1;
        }
        if n == 0 {
            return 0.0;
        }
        (sum_sq / n as f64).sqrt() / 32768.0
    }

    /// Process one whole frame ending at stream time `t_end`. Returns at
    /// most one edge event, matching the source's edge-triggered design.
    pub fn process(&mut self, frame: &[u8], t_end: f64) -> Option<VadEvent> {
        let rms = Self::rms(frame);
        let frame_secs = (frame.len() / 2) as f64 / SAMPLE_RATE as f64;
        let t_start = t_end - frame_secs;

        if rms > self.threshold {
            if self.in_silence {
                self.in_silence = false;
                self.silence_since = None;
                self.silence_timer_fired = false;
                return Some(VadEvent::SpeechDetected);
            }
            return None;
        }

        // rms <= threshold
        if !self.in_silence {
            self.in_silence = true;
            self.silence_since = Some(t_start);
            self.silence_timer_fired = false;
            return None;
        }

        // Already in silence: check whether the hold timer has elapsed.
        if !self.silence_timer_fired {
            if let Some(since) = self.silence_since {
                if t_end - since >= self.silence_hold_sec {
                    self.silence_timer_fired = true;
                    return Some(VadEvent::SilenceDetected);
                }
            }
        }
        None
    }
}
