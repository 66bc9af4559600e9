//! Pipeline configuration (spec §6).
//!
//! Redesigned from the source's global settings singleton: callers build
//! a `PipelineConfig` and pass it into `AudioPipeline::new` explicitly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Nominal window length `W`, seconds.
    #[serde(default = "default_window_size_sec")]
    pub window_size_sec: f64,
    /// Heartbeat period; 0 means use `window_size_sec`.
    #[serde(default)]
    pub step_sec: f64,
    /// VAD RMS threshold `θ`.
    #[serde(default = "default_silence_threshold_rms")]
    pub silence_threshold_rms: f64,
    /// Silence hold before `SilenceDetected`, `Tₛ`.
    #[serde(default = "default_silence_hold_sec")]
    pub silence_hold_sec: f64,
    /// Pre-roll lookback, `P`.
    #[serde(default = "default_pre_roll_sec")]
    pub pre_roll_sec: f64,
    /// Max extension beyond nominal window, `E`.
    #[serde(default = "default_max_extension_sec")]
    pub max_extension_sec: f64,
    /// Max extension as a ratio of `W`, `R`.
    #[serde(default = "default_max_extension_ratio")]
    pub max_extension_ratio: f64,
    /// Required inter-word pause duration, `Pₚ`.
    #[serde(default = "default_word_pause_sec")]
    pub word_pause_sec: f64,
    /// Bounded intake queue capacity, `Qᵢ`.
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
    /// Number of transcription workers, `N`.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Worker warm-up timeout, seconds.
    #[serde(default = "default_warmup_timeout_sec")]
    pub warmup_timeout_sec: u64,
    /// Worker transcribe-call read timeout, seconds.
    #[serde(default = "default_transcribe_timeout_sec")]
    pub transcribe_timeout_sec: u64,
}

fn default_window_size_sec() -> f64 {
    3.0
}
fn default_silence_threshold_rms() -> f64 {
    0.007
}
fn default_silence_hold_sec() -> f64 {
    1.0
}
fn default_pre_roll_sec() -> f64 {
    0.4
}
fn default_max_extension_sec() -> f64 {
    0.5
}
fn default_max_extension_ratio() -> f64 {
    1.5
}
fn default_word_pause_sec() -> f64 {
    0.05
}
fn default_intake_capacity() -> usize {
    10
}
fn default_worker_count() -> usize {
    2
}
fn default_warmup_timeout_sec() -> u64 {
    30
}
fn default_transcribe_timeout_sec() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size_sec: default_window_size_sec(),
            step_sec: 0.0,
            silence_threshold_rms: default_silence_threshold_rms(),
            silence_hold_sec: default_silence_hold_sec(),
            pre_roll_sec: default_pre_roll_sec(),
            max_extension_sec: default_max_extension_sec(),
            max_extension_ratio: default_max_extension_ratio(),
            word_pause_sec: default_word_pause_sec(),
            intake_capacity: default_intake_capacity(),
            worker_count: default_worker_count(),
            warmup_timeout_sec: default_warmup_timeout_sec(),
            transcribe_timeout_sec: default_transcribe_timeout_sec(),
        }
    }
}

impl PipelineConfig {
    /// Heartbeat period to actually use: `step_sec`, or `window_size_sec` if unset.
    pub fn effective_step_sec(&self) -> f64 {
        if self.step_sec > 0.0 {
            self.step_sec
        } else {
            self.window_size_sec
        }
    }

    /// Max extra seconds the window buffer may extend by: `min(E, W*R)`.
    pub fn max_extension_cap_sec(&self) -> f64 {
        self.max_extension_sec
            .min(self.window_size_sec * self.max_extension_ratio)
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.window_size_sec, 3.0);
        assert_eq!(cfg.step_sec, 0.0);
        assert_eq!(cfg.silence_threshold_rms, 0.007);
        assert_eq!(cfg.silence_hold_sec, 1.0);
        assert_eq!(cfg.pre_roll_sec, 0.4);
        assert_eq!(cfg.max_extension_sec, 0.5);
        assert_eq!(cfg.max_extension_ratio, 1.5);
        assert_eq!(cfg.word_pause_sec, 0.05);
        assert_eq!(cfg.intake_capacity, 10);
        assert_eq!(cfg.worker_count, 2);
    }

    #[test]
    fn effective_step_falls_back_to_window_size() {
        let mut cfg = PipelineConfig::default();
        cfg.step_sec = 0.0;
        assert_eq!(cfg.effective_step_sec(), cfg.window_size_sec);
        cfg.step_sec = 1.5;
        assert_eq!(cfg.effective_step_sec(), 1.5);
    }

    #[test]
    fn max_extension_cap_uses_smaller_of_absolute_and_ratio() {
        let mut cfg = PipelineConfig::default();
        cfg.window_size_sec = 0.1;
        cfg.max_extension_sec = 0.5;
        cfg.max_extension_ratio = 1.5;
        // W*R = 0.15, smaller than E = 0.5
        assert!((cfg.max_extension_cap_sec() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn json_roundtrip() {
        let cfg = PipelineConfig::default();
        let json = cfg.to_json_pretty().unwrap();
        let back = PipelineConfig::from_json(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = PipelineConfig::from_json("{\"worker_count\": 4}").unwrap();
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.window_size_sec, 3.0);
    }
}
