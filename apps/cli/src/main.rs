//! Synthetic-audio demo driver for `streamscribe-core`: generates a
//! tone/silence stream in place of a microphone, feeds it through
//! `AudioPipeline`, and logs each committed transcript segment.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use streamscribe_core::reorder::{HistorySegment, TranscriptSink};
use streamscribe_core::worker::{LocalSegment, MockWorker, TranscriptionWorker};
use streamscribe_core::{AudioPipeline, PipelineConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const FRAME_SAMPLES: usize = 320; // 20ms @ 16kHz mono

/// Initialize logging with console output (and a rolling file alongside it).
fn init_logging(file_writer: tracing_appender::non_blocking::NonBlocking) {
    let console_layer = tracing_subscriber::fmt::layer();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}

/// Prints every committed segment as it is appended, in order.
struct PrintingSink;

impl TranscriptSink for PrintingSink {
    fn append(&mut self, segments: &[HistorySegment]) {
        for seg in segments {
            info!(
                start = seg.start_abs,
                end = seg.end_abs,
                speaker = seg.speaker_id,
                "{}",
                seg.text
            );
        }
    }
}

fn tone_frame(amplitude: i16) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_SAMPLES * 2);
    for i in 0..FRAME_SAMPLES {
        // A gentle 220Hz sine at the given peak amplitude, silence is just amplitude 0.
        let phase = 2.0 * std::f64::consts::PI * 220.0 * (i as f64 / 16_000.0);
        let sample = (phase.sin() * amplitude as f64) as i16;
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

fn mock_factory() -> Arc<dyn Fn() -> Box<dyn TranscriptionWorker> + Send + Sync> {
    Arc::new(|| {
        let mut worker = MockWorker::new("(demo transcript)");
        worker.push_script(vec![LocalSegment {
            start_sec: 0.0,
            end_sec: 1.0,
            text: "hello from the demo pipeline".into(),
        }]);
        Box::new(worker) as Box<dyn TranscriptionWorker>
    })
}

fn main() -> Result<()> {
    let log_dir = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let file_appender = tracing_appender::rolling::never(&log_dir, "streamscribe-cli.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    init_logging(file_writer);

    info!("streamscribe synthetic-audio demo starting");

    let tmp_dir = std::env::temp_dir().join("streamscribe-cli-demo");
    std::fs::create_dir_all(&tmp_dir)?;

    let config = PipelineConfig::default();
    let sink = Arc::new(Mutex::new(PrintingSink));
    let pipeline = AudioPipeline::with_sink_and_labeler(
        &config,
        tmp_dir,
        mock_factory(),
        sink,
        Arc::new(streamscribe_core::diarization::SingleSpeaker),
    );

    let mut t = 0.0;
    let frame_dur = FRAME_SAMPLES as f64 / 16_000.0;

    // 0.5s of silence, 2.5s of "speech", 1.5s of trailing silence.
    for _ in 0..25 {
        t += frame_dur;
        pipeline.ingest_frame(&tone_frame(0), t)?;
    }
    for _ in 0..125 {
        t += frame_dur;
        pipeline.ingest_frame(&tone_frame(3_000), t)?;
        pipeline.heartbeat(t);
    }
    for _ in 0..75 {
        t += frame_dur;
        pipeline.ingest_frame(&tone_frame(0), t)?;
    }

    // Give the runner pool a moment to finish transcribing and flush the
    // reorder buffer before the process exits.
    std::thread::sleep(Duration::from_millis(500));

    let stats = pipeline.stats();
    info!(
        intake = stats.intake_count,
        reorder_pending = stats.reorder_count,
        "demo run complete"
    );

    Ok(())
}
