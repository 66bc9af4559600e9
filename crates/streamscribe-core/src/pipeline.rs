//! Audio pipeline orchestrator (spec §4.7): wires C1–C6 together, owns
//! the sequence counter, and exposes the queue-stats observability
//! surface.

use crate::config::PipelineConfig;
use crate::diarization::{SingleSpeaker, SpeakerLabeler};
use crate::error::PipelineError;
use crate::pause::{PauseController, PauseState};
use crate::reorder::{HistorySegment, ReorderBuffer, TranscriptSink, VecTranscriptSink};
use crate::ring::RingBuffer;
use crate::runner::{RunnerPool, WindowTask};
use crate::stats::{QueueStats, RunnerStat, StatsNotifier};
use crate::vad::Vad;
use crate::wav;
use crate::window::WindowBuffer;
use crate::worker::{LocalSegment, TranscriptFragment, TranscriptionWorker};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

struct Collectors {
    vad: Vad,
    ring: RingBuffer,
    window: WindowBuffer,
    last_pause_state: PauseState,
    resume_floor: f64,
}

/// Owns C1–C6 and the next-sequence counter; `ingest_frame` is the sole
/// entry point the capture thread calls (spec §5: "capture thread is
/// the only writer").
pub struct AudioPipeline {
    collectors: Mutex<Collectors>,
    sequence_counter: AtomicU64,
    pause: PauseController,
    runner_pool: Arc<RunnerPool>,
    reorder: Arc<Mutex<ReorderBuffer>>,
    sink: Arc<Mutex<dyn TranscriptSink>>,
    stats: StatsNotifier,
    tmp_dir: PathBuf,
}

impl AudioPipeline {
    /// Build a pipeline with the default `VecTranscriptSink` and
    /// `SingleSpeaker` labeler, windows saved under `tmp_dir`.
    pub fn new(
        config: &PipelineConfig,
        tmp_dir: PathBuf,
        worker_factory: Arc<dyn Fn() -> Box<dyn TranscriptionWorker> + Send + Sync>,
    ) -> Arc<Self> {
        Self::with_sink_and_labeler(
            config,
            tmp_dir,
            worker_factory,
            Arc::new(Mutex::new(VecTranscriptSink::new())),
            Arc::new(SingleSpeaker),
        )
    }

    pub fn with_sink_and_labeler(
        config: &PipelineConfig,
        tmp_dir: PathBuf,
        worker_factory: Arc<dyn Fn() -> Box<dyn TranscriptionWorker> + Send + Sync>,
        sink: Arc<Mutex<dyn TranscriptSink>>,
        labeler: Arc<dyn SpeakerLabeler>,
    ) -> Arc<Self> {
        let pause = PauseController::new();
        let reorder = Arc::new(Mutex::new(ReorderBuffer::new()));
        let stats = StatsNotifier::new();

        let ring_capacity_sec =
            3.0 * config.window_size_sec + config.max_extension_cap_sec();
        let collectors = Mutex::new(Collectors {
            vad: Vad::new(config.silence_threshold_rms, config.silence_hold_sec),
            ring: RingBuffer::new(ring_capacity_sec),
            window: WindowBuffer::new(config),
            last_pause_state: PauseState::None,
            resume_floor: 0.0,
        });

        let workers: Vec<Box<dyn TranscriptionWorker>> =
            (0..config.worker_count).map(|_| worker_factory()).collect();

        let reorder_for_complete = reorder.clone();
        let sink_for_complete = sink.clone();
        let labeler_for_complete = labeler;
        let stats_for_complete = stats.clone();

        let on_complete: Arc<dyn Fn(u64, f64, Vec<LocalSegment>) + Send + Sync> =
            Arc::new(move |seq: u64, w_start: f64, local_segments: Vec<LocalSegment>| {
                let fragments: Vec<TranscriptFragment> = local_segments
                    .iter()
                    .map(|seg| TranscriptFragment {
                        start_abs: w_start + seg.start_sec,
                        end_abs: w_start + seg.end_sec,
                        text: seg.text.clone(),
                    })
                    .collect();
                // Speaker join happens in absolute time (spec §4.7): the
                // labeler only ever sees `frag.start_abs`/`end_abs`, never
                // the window-local clock, since every window restarts that
                // clock at 0.
                let history: Vec<HistorySegment> = fragments
                    .into_iter()
                    .map(|frag| HistorySegment {
                        timestamp: frag.end_abs,
                        speaker_id: labeler_for_complete.label(frag.start_abs, frag.end_abs),
                        start_abs: frag.start_abs,
                        end_abs: frag.end_abs,
                        text: frag.text,
                    })
                    .collect();
                let mut sink = sink_for_complete.lock();
                reorder_for_complete.lock().insert(seq, history, &mut *sink);
                stats_for_complete.notify();
            });

        let stats_for_dispatch = stats.clone();
        let on_stats_changed: Arc<dyn Fn() + Send + Sync> =
            Arc::new(move || stats_for_dispatch.notify());

        let runner_pool = RunnerPool::new(
            config.intake_capacity,
            workers,
            worker_factory,
            Duration::from_secs(config.warmup_timeout_sec),
            Duration::from_secs(config.transcribe_timeout_sec),
            on_complete,
            on_stats_changed,
        );

        Arc::new(Self {
            collectors,
            sequence_counter: AtomicU64::new(0),
            pause,
            runner_pool,
            reorder,
            sink,
            stats,
            tmp_dir,
        })
    }

    pub fn pause_controller(&self) -> &PauseController {
        &self.pause
    }

    pub fn subscribe_stats(&self) -> crossbeam_channel::Receiver<()> {
        self.stats.subscribe()
    }

    pub fn stats(&self) -> QueueStats {
        let intake = self.runner_pool.intake();
        QueueStats {
            intake_count: intake.len(),
            intake_cap: intake.capacity(),
            per_runner: self
                .runner_pool
                .runner_queue_lens()
                .into_iter()
                .zip(self.runner_pool.runner_processing())
                .map(|(queue_count, is_processing)| RunnerStat {
                    queue_count,
                    is_processing,
                })
                .collect(),
            reorder_count: self.reorder.lock().pending_count(),
        }
    }

    /// Feed one whole PCM frame ending at stream time `t_end`. The sole
    /// entry point the capture thread calls (spec §5). Fatal per spec §7:
    /// a frame whose byte length isn't a whole number of 16-bit samples
    /// can't be captured 16kHz/mono/16-bit PCM, and is reported upward
    /// rather than silently absorbed.
    pub fn ingest_frame(&self, frame: &[u8], t_end: f64) -> Result<(), PipelineError> {
        if frame.len() % 2 != 0 {
            let err = PipelineError::CaptureFormatMismatch {
                detail: format!("frame has odd byte length {}", frame.len()),
            };
            error!(%err);
            return Err(err);
        }

        let mut c = self.collectors.lock();

        let vad_event = c.vad.process(frame, t_end);
        if let Some(event) = vad_event {
            self.pause.on_vad_event(event);
        }
        c.ring.write(frame, t_end);

        let current_pause = self.pause.state();
        if current_pause != c.last_pause_state {
            if current_pause != PauseState::None {
                c.window.abort();
            } else {
                c.resume_floor = t_end;
            }
            c.last_pause_state = current_pause;
        }

        if current_pause != PauseState::None {
            // Spec §4.1: C4 drops incoming frames and rejects window
            // saves while paused; C2/C3 above already ran unconditionally.
            return Ok(());
        }

        let floor = c.resume_floor;
        let was_idle = !c.window.is_collecting();
        let Collectors { ring, window, .. } = &mut *c;

        // A `SpeechDetected` edge arriving while Idle starts the window by
        // copying the ring up through (and including) this frame's bytes
        // (spec §4.4 "Start conditions"); feeding the same frame through
        // `ingest_frame` afterward would append it a second time.
        let mut already_included = false;
        if let Some(event) = vad_event {
            if let Some(ready) = window.notify_vad(event, t_end, ring, floor) {
                drop(c);
                self.emit_window(ready.w_start, ready.pcm);
                return Ok(());
            }
            already_included = was_idle && window.is_collecting();
        }

        if already_included {
            return Ok(());
        }
        if let Some(ready) = window.ingest_frame(frame, t_end, ring) {
            drop(c);
            self.emit_window(ready.w_start, ready.pcm);
        }
        Ok(())
    }

    /// Coarse heartbeat (spec §4.4 "Timer"): force-emits a full window
    /// during ongoing speech. No-op under pause or while idle.
    pub fn heartbeat(&self, t_now: f64) {
        let mut c = self.collectors.lock();
        if self.pause.is_active() {
            return;
        }
        let Collectors { ring, window, .. } = &mut *c;
        if let Some(ready) = window.heartbeat(t_now, ring) {
            drop(c);
            self.emit_window(ready.w_start, ready.pcm);
        }
    }

    fn emit_window(&self, w_start: f64, pcm: Vec<u8>) {
        let seq = self.sequence_counter.fetch_add(1, Ordering::SeqCst);
        let path = self.tmp_dir.join(format!("window-{seq}.wav"));
        if let Err(e) = wav::write_wav(&path, &pcm) {
            error!(seq, error = %e, "failed to write window WAV, dropping window");
            // Spec §7: WavWriteFailed drops the window but must still
            // register an empty result so the reorder buffer advances.
            let mut sink = self.sink.lock();
            self.reorder.lock().insert(seq, Vec::new(), &mut *sink);
            self.stats.notify();
            return;
        }
        let dropped = self.runner_pool.intake().push(WindowTask {
            wav_path: path,
            start_abs_sec: w_start,
            sequence_number: seq,
        });
        if let Some(dropped_seq) = dropped {
            let err = PipelineError::IntakeOverflow {
                dropped_sequence: dropped_seq,
            };
            warn!(%err);
        }
        self.stats.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::MockWorker;

    fn tone(n_samples: usize, amplitude: i16) -> Vec<u8> {
        let mut out = Vec::with_capacity(n_samples * 2);
        for _ in 0..n_samples {
            out.extend_from_slice(&amplitude.to_le_bytes());
        }
        out
    }

    fn mock_factory(text: &'static str) -> Arc<dyn Fn() -> Box<dyn TranscriptionWorker> + Send + Sync> {
        Arc::new(move || Box::new(MockWorker::new(text)) as Box<dyn TranscriptionWorker>)
    }

    fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn single_phrase_produces_one_window_and_transcript_a() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.worker_count = 1;
        let sink = Arc::new(Mutex::new(VecTranscriptSink::new()));
        let pipeline = AudioPipeline::with_sink_and_labeler(
            &cfg,
            dir.path().to_path_buf(),
            mock_factory("A"),
            sink.clone(),
            Arc::new(SingleSpeaker),
        );

        let mut t = 0.0;
        // 0.4s silence
        for _ in 0..20 {
            let frame = tone(320, 0);
            t += 0.02;
            pipeline.ingest_frame(&frame, t).unwrap();
        }
        // 2.0s loud tone
        for _ in 0..100 {
            let frame = tone(320, 3_000);
            t += 0.02;
            pipeline.ingest_frame(&frame, t).unwrap();
        }
        // 1.5s silence
        for _ in 0..75 {
            let frame = tone(320, 0);
            t += 0.02;
            pipeline.ingest_frame(&frame, t).unwrap();
        }

        let ok = wait_until(|| !sink.lock().history.is_empty(), Duration::from_secs(2));
        assert!(ok, "expected at least one transcript segment");
        let history = sink.lock().history.clone();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "A");
    }

    #[test]
    fn pause_suppresses_new_windows() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.worker_count = 1;
        let sink = Arc::new(Mutex::new(VecTranscriptSink::new()));
        let pipeline = AudioPipeline::with_sink_and_labeler(
            &cfg,
            dir.path().to_path_buf(),
            mock_factory("A"),
            sink.clone(),
            Arc::new(SingleSpeaker),
        );
        pipeline.pause_controller().set_manual(true);

        let mut t = 0.0;
        for _ in 0..100 {
            let frame = tone(320, 3_000);
            t += 0.02;
            pipeline.ingest_frame(&frame, t).unwrap();
        }
        std::thread::sleep(Duration::from_millis(200));
        assert!(sink.lock().history.is_empty());
    }

    #[test]
    fn odd_length_frame_is_a_fatal_format_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.worker_count = 1;
        let pipeline = AudioPipeline::new(&cfg, dir.path().to_path_buf(), mock_factory("A"));
        let err = pipeline.ingest_frame(&[0u8; 3], 0.02).unwrap_err();
        assert!(matches!(err, PipelineError::CaptureFormatMismatch { .. }));
    }

    #[test]
    fn stats_report_intake_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.worker_count = 2;
        cfg.intake_capacity = 10;
        let pipeline = AudioPipeline::new(&cfg, dir.path().to_path_buf(), mock_factory("A"));
        let stats = pipeline.stats();
        assert_eq!(stats.intake_cap, 10);
        assert_eq!(stats.per_runner.len(), 2);
    }

    #[test]
    fn out_of_order_worker_completion_preserves_sink_order() {
        // Covers spec T3 at the reorder-buffer layer directly: simulate
        // worker-1 finishing seq 1 before worker-0 finishes seq 0.
        let sink = Arc::new(Mutex::new(VecTranscriptSink::new()));
        let reorder = Arc::new(Mutex::new(ReorderBuffer::new()));

        let seg = |text: &str, end: f64| HistorySegment {
            timestamp: end,
            speaker_id: 1,
            start_abs: end - 1.0,
            end_abs: end,
            text: text.to_string(),
        };

        reorder.lock().insert(1, vec![seg("B", 2.0)], &mut *sink.lock());
        assert!(sink.lock().history.is_empty());
        reorder.lock().insert(0, vec![seg("A", 1.0)], &mut *sink.lock());

        let texts: Vec<_> = sink
            .lock()
            .history
            .iter()
            .map(|s| s.text.clone())
            .collect();
        assert_eq!(texts, vec!["A", "B"]);
    }
}
