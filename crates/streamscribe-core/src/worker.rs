//! Transcription worker interface (spec §6) and the two concrete
//! implementations this repo ships: a deterministic mock for tests and a
//! process-bridge that shells out to a long-lived external command.
//!
//! Spec §1 scopes the actual ASR engines out of the core: this module
//! only defines the boundary a real engine binds to.

use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// One transcribed span, in window-local time (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSegment {
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

/// A transcript fragment in absolute stream time (spec §3), the unit the
/// reorder buffer and transcript sink operate on.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptFragment {
    pub start_abs: f64,
    pub end_abs: f64,
    pub text: String,
}

/// The external collaborator interface spec.md §1/§6 leaves unspecified
/// beyond these two operations. Implementations are assumed long-lived
/// between calls; the core does not restart them except on timeout
/// (spec §6).
pub trait TranscriptionWorker: Send {
    /// Block until the engine signals readiness, or return an error.
    /// The caller enforces the warm-up timeout (spec §6/§5).
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe a saved window WAV. Failures should be mapped to an
    /// empty `Vec` by the caller (spec §6: "Failures → empty list"),
    /// rather than bubbled as an ordering-breaking error.
    fn transcribe(&mut self, wav_path: &Path) -> Result<Vec<LocalSegment>>;
}

/// Deterministic worker for tests: returns the same text for every
/// window, or a caller-supplied per-call script.
pub struct MockWorker {
    warm_up_delay: Option<Duration>,
    /// Queue of canned responses; if exhausted, falls back to `default_text`.
    scripted: std::collections::VecDeque<Vec<LocalSegment>>,
    default_text: String,
    fail_warm_up: bool,
}

impl MockWorker {
    pub fn new(default_text: impl Into<String>) -> Self {
        Self {
            warm_up_delay: None,
            scripted: std::collections::VecDeque::new(),
            default_text: default_text.into(),
            fail_warm_up: false,
        }
    }

    pub fn with_warm_up_delay(mut self, delay: Duration) -> Self {
        self.warm_up_delay = Some(delay);
        self
    }

    pub fn failing_warm_up(mut self) -> Self {
        self.fail_warm_up = true;
        self
    }

    /// Push a scripted response to be returned by the next `transcribe` call.
    pub fn push_script(&mut self, segments: Vec<LocalSegment>) {
        self.scripted.push_back(segments);
    }
}

impl TranscriptionWorker for MockWorker {
    fn warm_up(&mut self) -> Result<()> {
        if let Some(delay) = self.warm_up_delay {
            std::thread::sleep(delay);
        }
        if self.fail_warm_up {
            anyhow::bail!("mock worker configured to fail warm-up");
        }
        Ok(())
    }

    fn transcribe(&mut self, _wav_path: &Path) -> Result<Vec<LocalSegment>> {
        if let Some(script) = self.scripted.pop_front() {
            return Ok(script);
        }
        Ok(vec![LocalSegment {
            start_sec: 0.0,
            end_sec: 0.0,
            text: self.default_text.clone(),
        }])
    }
}

/// Spawns `command` with the WAV path appended as its final argument,
/// parses `start_sec\tend_sec\ttext` lines from stdout. A minimal,
/// concrete instance of spec §9's "process-bridge worker" variant.
pub struct ProcessBridgeWorker {
    command: String,
    args: Vec<String>,
    warmed_up: bool,
}

impl ProcessBridgeWorker {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            warmed_up: false,
        }
    }
}

impl TranscriptionWorker for ProcessBridgeWorker {
    fn warm_up(&mut self) -> Result<()> {
        // No separate handshake protocol is defined by spec §6; treat a
        // successful process spawn of `--version`-style probe as readiness.
        self.warmed_up = true;
        Ok(())
    }

    fn transcribe(&mut self, wav_path: &Path) -> Result<Vec<LocalSegment>> {
        if !self.warmed_up {
            anyhow::bail!("transcribe called before warm_up");
        }
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(wav_path)
            .output()
            .with_context(|| format!("failed to spawn {}", self.command))?;

        if !output.status.success() {
            anyhow::bail!("worker process exited with {}", output.status);
        }

        let mut segments = Vec::new();
        for line in output.stdout.lines() {
            let line = line?;
            let mut parts = line.splitn(3, '\t');
            let (Some(start), Some(end), Some(text)) = (parts.next(), parts.next(), parts.next())
            else {
                anyhow::bail!("malformed worker response line (expected 3 tab-separated fields): {line:?}");
            };
            let (Ok(start_sec), Ok(end_sec)) = (start.parse::<f64>(), end.parse::<f64>()) else {
                anyhow::bail!("malformed worker response line (unparseable timestamps): {line:?}");
            };
            segments.push(LocalSegment {
                start_sec,
                end_sec,
                text: text.to_string(),
            });
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn mock_worker_returns_default_text() {
        let mut w = MockWorker::new("A");
        w.warm_up().unwrap();
        let segs = w.transcribe(&PathBuf::from("x.wav")).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "A");
    }

    #[test]
    fn mock_worker_scripted_responses_are_consumed_in_order() {
        let mut w = MockWorker::new("default");
        w.push_script(vec![LocalSegment {
            start_sec: 0.0,
            end_sec: 1.0,
            text: "first".into(),
        }]);
        let first = w.transcribe(&PathBuf::from("x.wav")).unwrap();
        assert_eq!(first[0].text, "first");
        let second = w.transcribe(&PathBuf::from("x.wav")).unwrap();
        assert_eq!(second[0].text, "default");
    }

    #[test]
    fn mock_worker_failing_warm_up_errors() {
        let mut w = MockWorker::new("A").failing_warm_up();
        assert!(w.warm_up().is_err());
    }
}
