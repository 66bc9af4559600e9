//! Adaptive windowing buffer (spec §4.4) — the hardest subsystem.
//!
//! Converts a continuous PCM stream into variable-length WAV windows that
//! start at speech onset, end at a natural inter-word pause when
//! possible, chain seamlessly while speech continues, and never drop or
//! duplicate audio.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::ring::{RingBuffer, BYTES_PER_SEC};
use crate::vad::{Vad, VadEvent};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Collecting,
    Extending,
}

/// A window handed off to the pipeline for WAV encoding and dispatch.
#[derive(Debug, Clone)]
pub struct WindowReady {
    pub w_start: f64,
    pub w_end: f64,
    pub pcm: Vec<u8>,
    pub has_speech: bool,
}

fn round_down_even(n: usize) -> usize {
    n - (n % 2)
}

/// Analyze the trailing `min(0.3s, buffer duration)` of `buf` in 10ms
/// chunks; return the byte offset of the start of the first contiguous
/// silence run of at least `word_pause_sec`, or `None` (spec §4.4
/// "Word-boundary detection").
fn find_word_boundary(buf: &[u8], word_pause_sec: f64, threshold: f64) -> Option<usize> {
    const CHUNK_SEC: f64 = 0.01;
    let chunk_bytes = round_down_even((CHUNK_SEC * BYTES_PER_SEC as f64) as usize).max(2);

    let trailing_sec = 0.3_f64.min(buf.len() as f64 / BYTES_PER_SEC as f64);
    let trailing_bytes = round_down_even((trailing_sec * BYTES_PER_SEC as f64) as usize);
    let region_start = buf.len() - trailing_bytes;
    let region = &buf[region_start..];

    let needed_chunks = (word_pause_sec / CHUNK_SEC).ceil() as usize;
    if needed_chunks == 0 {
        return None;
    }

    let mut run_start: Option<usize> = None;
    let mut run_len = 0usize;
    let mut offset = 0usize;
    while offset + chunk_bytes <= region.len() {
        let chunk = &region[offset..offset + chunk_bytes];
        let rms = Vad::rms(chunk);
        if rms < threshold {
            if run_start.is_none() {
                run_start = Some(offset);
            }
            run_len += 1;
            if run_len >= needed_chunks {
                return Some(region_start + run_start.unwrap());
            }
        } else {
            run_start = None;
            run_len = 0;
        }
        offset += chunk_bytes;
    }
    None
}

pub struct WindowBuffer {
    state: State,
    buf: Vec<u8>,
    w_start: f64,
    has_speech: bool,
    /// True while the global VAD edge state considers the stream "speech"
    /// (set on `SpeechDetected`, cleared on `SilenceDetected`); used to
    /// keep `has_speech` correct across a chain, where no fresh edge event
    /// arrives even though the underlying audio is still speech.
    speech_active: bool,
    last_speech_t: f64,
    pre_roll_sec: f64,
    word_pause_sec: f64,
    threshold: f64,
    window_bytes: usize,
    ext_cap_bytes: usize,
}

impl WindowBuffer {
    pub fn new(config: &PipelineConfig) -> Self {
        let window_bytes =
            round_down_even((config.window_size_sec * BYTES_PER_SEC as f64) as usize);
        let ext_cap_bytes =
            round_down_even((config.max_extension_cap_sec() * BYTES_PER_SEC as f64) as usize);
        Self {
            state: State::Idle,
            buf: Vec::new(),
            w_start: 0.0,
            has_speech: false,
            speech_active: false,
            last_speech_t: 0.0,
            pre_roll_sec: config.pre_roll_sec,
            word_pause_sec: config.word_pause_sec,
            threshold: config.silence_threshold_rms,
            window_bytes,
            ext_cap_bytes,
        }
    }

    pub fn is_collecting(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    pub fn w_start(&self) -> f64 {
        self.w_start
    }

    /// Discard any in-progress window without emitting it (used when a
    /// pause begins while collecting — spec §4.1: C4 must drop frames and
    /// reject window saves while paused).
    pub fn abort(&mut self) {
        self.state = State::Idle;
        self.buf.clear();
        self.has_speech = false;
    }

    /// Feed a VAD edge event. `floor` is a lower clamp on the next
    /// window's `w_start` (the pipeline sets this to the most recent
    /// resume time, so pre-roll never reaches back across a pause).
    pub fn notify_vad(
        &mut self,
        event: VadEvent,
        t: f64,
        ring: &RingBuffer,
        floor: f64,
    ) -> Option<WindowReady> {
        match event {
            VadEvent::SpeechDetected => {
                self.speech_active = true;
                if matches!(self.state, State::Idle) {
                    let w_start = (t - self.pre_roll_sec)
                        .max(ring.ring_start_t())
                        .max(floor)
                        .max(0.0);
                    self.buf.clear();
                    let copied = ring.copy_range(w_start, t, &mut self.buf);
                    if copied == 0 && t > w_start {
                        let err = PipelineError::RingOutOfRange { from: w_start, to: t };
                        warn!(%err);
                    }
                    self.w_start = w_start;
                    self.has_speech = true;
                    self.last_speech_t = t;
                    self.state = State::Collecting;
                }
                None
            }
            VadEvent::SilenceDetected => {
                self.speech_active = false;
                if matches!(self.state, State::Collecting) {
                    let window_duration = self.buf.len() as f64 / BYTES_PER_SEC as f64;
                    if self.has_speech
                        && window_duration >= 0.5
                        && (t - self.last_speech_t) >= 1.0
                    {
                        return Some(self.emit_and_idle(self.buf.len()));
                    }
                }
                None
            }
        }
    }

    /// Append one whole frame ending at `t_end`. No-op while `Idle`.
    pub fn ingest_frame(
        &mut self,
        frame: &[u8],
        t_end: f64,
        ring: &RingBuffer,
    ) -> Option<WindowReady> {
        if matches!(self.state, State::Idle) {
            return None;
        }

        if self.speech_active {
            self.has_speech = true;
            self.last_speech_t = t_end;
        }

        let cap = self.window_bytes + self.ext_cap_bytes;
        let room = cap.saturating_sub(self.buf.len());
        let take = frame.len().min(room);
        self.buf.extend_from_slice(&frame[..take]);

        if matches!(self.state, State::Extending) {
            if let Some(boundary) = find_word_boundary(&self.buf, self.word_pause_sec, self.threshold)
            {
                return Some(self.emit_and_chain(boundary, ring, t_end));
            }
            if self.buf.len() >= cap {
                return Some(self.emit_and_chain(self.buf.len(), ring, t_end));
            }
        } else if self.buf.len() >= self.window_bytes {
            self.state = State::Extending;
        }
        None
    }

    /// Coarse heartbeat: force-emit a window that has reached full size
    /// while speech is ongoing. Never starts a window.
    pub fn heartbeat(&mut self, t_now: f64, ring: &RingBuffer) -> Option<WindowReady> {
        if !matches!(self.state, State::Idle) && self.buf.len() >= self.window_bytes {
            Some(self.emit_and_chain(self.buf.len(), ring, t_now))
        } else {
            None
        }
    }

    fn emit_and_chain(&mut self, cut: usize, ring: &RingBuffer, t_now: f64) -> WindowReady {
        let window = self.cut_window(cut);
        self.buf.clear();
        if ring.logical_offset(window.w_end).is_some() {
            ring.copy_range(window.w_end, t_now, &mut self.buf);
            self.w_start = window.w_end;
        } else {
            let err = PipelineError::RingOutOfRange {
                from: window.w_end,
                to: t_now,
            };
            warn!(%err);
            self.w_start = t_now;
        }
        self.state = State::Collecting;
        self.has_speech = false;
        window
    }

    fn emit_and_idle(&mut self, cut: usize) -> WindowReady {
        let window = self.cut_window(cut);
        self.buf.clear();
        self.state = State::Idle;
        self.has_speech = false;
        window
    }

    fn cut_window(&self, cut: usize) -> WindowReady {
        let cut = round_down_even(cut.min(self.buf.len()));
        let pcm = self.buf[..cut].to_vec();
        let w_end = self.w_start + cut as f64 / BYTES_PER_SEC as f64;
        WindowReady {
            w_start: self.w_start,
            w_end,
            pcm,
            has_speech: self.has_speech,
        }
    }
}
