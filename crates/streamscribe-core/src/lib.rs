//! Audio-to-ordered-transcript pipeline core: voice activity detection,
//! an adaptive windowing buffer backed by a ring, a runner pool with
//! round-robin dispatch, a reorder buffer, and the pause state machine
//! that gates all of the above.

pub mod config;
pub mod diarization;
pub mod error;
pub mod pause;
pub mod pipeline;
pub mod reorder;
pub mod ring;
pub mod runner;
pub mod stats;
pub mod vad;
pub mod wav;
pub mod window;
pub mod worker;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pause::{PauseController, PauseState};
pub use pipeline::AudioPipeline;
pub use reorder::{HistorySegment, TranscriptSink, VecTranscriptSink};
pub use stats::QueueStats;
pub use worker::{LocalSegment, TranscriptionWorker};
