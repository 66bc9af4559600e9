//! Typed error kinds for the pipeline.
//!
//! Most call sites propagate with `anyhow`; this enum exists for the
//! handful of cases a caller needs to match on (see spec §7).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("captured audio format mismatch: expected 16kHz/mono/16-bit PCM, got {detail}")]
    CaptureFormatMismatch { detail: String },

    #[error("requested range [{from}, {to}] is outside the ring buffer's buffered span")]
    RingOutOfRange { from: f64, to: f64 },

    #[error("failed to write WAV file at {path}: {source}")]
    WavWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {worker_id} did not signal readiness within {timeout_secs}s")]
    WorkerWarmupTimeout { worker_id: usize, timeout_secs: u64 },

    #[error("worker {worker_id} did not return within {timeout_secs}s for sequence {sequence}")]
    WorkerTranscribeTimeout {
        worker_id: usize,
        sequence: u64,
        timeout_secs: u64,
    },

    #[error("worker {worker_id} returned a malformed response for sequence {sequence}: {detail}")]
    WorkerMalformedResponse {
        worker_id: usize,
        sequence: u64,
        detail: String,
    },

    #[error("intake queue overflowed; dropped oldest task (sequence {dropped_sequence})")]
    IntakeOverflow { dropped_sequence: u64 },
}
