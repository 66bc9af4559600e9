//! Runner pool + dispatcher (spec §4.6): a bounded, oldest-drop intake
//! queue feeding N single-flight transcription runners, each with its
//! own unbounded FIFO and a round-robin-then-shortest-queue selector.

use crate::error::PipelineError;
use crate::worker::{LocalSegment, TranscriptionWorker};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// A saved window ready for transcription (spec §4.4 "Emission" output).
#[derive(Debug, Clone)]
pub struct WindowTask {
    pub wav_path: PathBuf,
    pub start_abs_sec: f64,
    pub sequence_number: u64,
}

/// Bounded intake queue (spec §4.6, `Qᵢ`): oldest entry is dropped on
/// overflow rather than blocking the caller. Backed by a mutex-guarded
/// deque plus a doorbell channel, since crossbeam's bounded channel
/// blocks full senders instead of evicting.
pub struct Intake {
    capacity: usize,
    queue: Mutex<VecDeque<WindowTask>>,
    doorbell_tx: crossbeam_channel::Sender<()>,
    doorbell_rx: crossbeam_channel::Receiver<()>,
}

impl Intake {
    pub fn new(capacity: usize) -> Self {
        let (doorbell_tx, doorbell_rx) = crossbeam_channel::unbounded();
        Self {
            capacity,
            queue: Mutex::new(VecDeque::new()),
            doorbell_tx,
            doorbell_rx,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push `task`, evicting the oldest entry first if already at
    /// capacity (spec §4.6 "Intake queue... oldest-dropped on
    /// overflow"). Returns the evicted task's sequence number, if any,
    /// for the caller to log as `PipelineError::IntakeOverflow`.
    pub fn push(&self, task: WindowTask) -> Option<u64> {
        let mut q = self.queue.lock();
        let dropped = if q.len() >= self.capacity {
            q.pop_front().map(|t| t.sequence_number)
        } else {
            None
        };
        q.push_back(task);
        drop(q);
        let _ = self.doorbell_tx.send(());
        dropped
    }

    fn drain(&self) -> Vec<WindowTask> {
        self.queue.lock().drain(..).collect()
    }

    fn doorbell(&self) -> &crossbeam_channel::Receiver<()> {
        &self.doorbell_rx
    }
}

/// Pick the runner to hand the next task to (spec §4.6 "Runner
/// selection", spec §7 `WorkerWarmupTimeout`: "worker marked unavailable;
/// dispatcher prefers others"). Three tiers, each scoped to the prior
/// tier failing entirely:
///
/// 1. round-robin from `last_selected + 1` for an idle (empty queue, not
///    mid-transcribe) *and available* runner;
/// 2. shortest queue among the available runners, ties broken by lowest
///    index;
/// 3. shortest queue among *all* runners, as a last resort — if every
///    runner is unavailable, dispatching must still make progress rather
///    than deadlock the intake forever.
pub fn select_runner(
    queue_lens: &[usize],
    processing: &[bool],
    available: &[bool],
    last_selected: usize,
) -> usize {
    let n = queue_lens.len();
    assert!(n > 0, "runner pool must have at least one runner");
    for offset in 1..=n {
        let idx = (last_selected + offset) % n;
        if available[idx] && !processing[idx] && queue_lens[idx] == 0 {
            return idx;
        }
    }
    if let Some(best) = shortest_queue(queue_lens, |i| available[i]) {
        return best;
    }
    shortest_queue(queue_lens, |_| true).expect("n > 0")
}

fn shortest_queue(queue_lens: &[usize], eligible: impl Fn(usize) -> bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for i in 0..queue_lens.len() {
        if !eligible(i) {
            continue;
        }
        best = match best {
            Some(b) if queue_lens[b] <= queue_lens[i] => Some(b),
            _ => Some(i),
        };
    }
    best
}

type ResultCallback = Arc<dyn Fn(u64, f64, Vec<LocalSegment>) + Send + Sync>;
type WorkerFactory = Arc<dyn Fn() -> Box<dyn TranscriptionWorker> + Send + Sync>;

fn transcribe_with_timeout(
    worker: Box<dyn TranscriptionWorker>,
    wav_path: PathBuf,
    timeout: Duration,
    factory: &WorkerFactory,
    runner_id: usize,
    sequence: u64,
) -> (Vec<LocalSegment>, Box<dyn TranscriptionWorker>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let mut worker = worker;
        let result = worker.transcribe(&wav_path);
        let _ = tx.send((worker, result));
    });
    match rx.recv_timeout(timeout) {
        Ok((worker, Ok(segments))) => (segments, worker),
        Ok((worker, Err(e))) => {
            let err = PipelineError::WorkerMalformedResponse {
                worker_id: runner_id,
                sequence,
                detail: e.to_string(),
            };
            warn!(%err);
            (Vec::new(), worker)
        }
        Err(_) => {
            let err = PipelineError::WorkerTranscribeTimeout {
                worker_id: runner_id,
                sequence,
                timeout_secs: timeout.as_secs(),
            };
            warn!(%err, "restarting worker");
            (Vec::new(), factory())
        }
    }
}

/// Warm up `worker` off-thread so a hung engine can't block the runner
/// forever (spec §7 `WorkerWarmupTimeout`). On timeout the worker is
/// replaced with a fresh instance from `factory`, left un-warmed, and
/// the runner is reported unavailable so the dispatcher prefers others
/// until a later warm-up succeeds.
fn warm_up_with_timeout(
    worker: Box<dyn TranscriptionWorker>,
    timeout: Duration,
    factory: &WorkerFactory,
    runner_id: usize,
) -> (Box<dyn TranscriptionWorker>, bool) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let mut worker = worker;
        let result = worker.warm_up();
        let _ = tx.send((worker, result));
    });
    match rx.recv_timeout(timeout) {
        Ok((worker, Ok(()))) => (worker, true),
        Ok((worker, Err(e))) => {
            warn!(runner = runner_id, error = %e, "worker warm-up failed");
            (worker, true)
        }
        Err(_) => {
            let err = PipelineError::WorkerWarmupTimeout {
                worker_id: runner_id,
                timeout_secs: timeout.as_secs(),
            };
            warn!(%err, "using a fresh instance, runner marked unavailable");
            (factory(), false)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn runner_loop(
    id: usize,
    mut worker: Box<dyn TranscriptionWorker>,
    factory: WorkerFactory,
    task_rx: crossbeam_channel::Receiver<WindowTask>,
    is_processing: Arc<AtomicBool>,
    available: Arc<AtomicBool>,
    warmup_timeout: Duration,
    transcribe_timeout: Duration,
    on_complete: ResultCallback,
    on_stats_changed: Arc<dyn Fn() + Send + Sync>,
) {
    let (warmed, is_available) = warm_up_with_timeout(worker, warmup_timeout, &factory, id);
    worker = warmed;
    available.store(is_available, Ordering::SeqCst);
    on_stats_changed();
    while let Ok(task) = task_rx.recv() {
        is_processing.store(true, Ordering::SeqCst);
        on_stats_changed();
        debug!(runner = id, seq = task.sequence_number, "transcribing window");
        let (segments, returned_worker) = transcribe_with_timeout(
            worker,
            task.wav_path.clone(),
            transcribe_timeout,
            &factory,
            id,
            task.sequence_number,
        );
        worker = returned_worker;
        is_processing.store(false, Ordering::SeqCst);
        on_stats_changed();
        on_complete(task.sequence_number, task.start_abs_sec, segments);
        let _ = std::fs::remove_file(&task.wav_path);
    }
    debug!(runner = id, "runner thread shutting down");
}

struct RunnerHandle {
    task_tx: Option<crossbeam_channel::Sender<WindowTask>>,
    task_rx_for_len: crossbeam_channel::Receiver<WindowTask>,
    is_processing: Arc<AtomicBool>,
    available: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

/// Owns the intake queue, the dispatcher thread, and every runner
/// thread. Dropping the pool closes all channels, which unwinds every
/// thread cleanly.
pub struct RunnerPool {
    intake: Arc<Intake>,
    runners: Vec<RunnerHandle>,
    last_selected: Arc<AtomicUsize>,
    dispatcher: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl RunnerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        intake_capacity: usize,
        workers: Vec<Box<dyn TranscriptionWorker>>,
        factory: WorkerFactory,
        warmup_timeout: Duration,
        transcribe_timeout: Duration,
        on_complete: ResultCallback,
        on_stats_changed: Arc<dyn Fn() + Send + Sync>,
    ) -> Arc<Self> {
        let intake = Arc::new(Intake::new(intake_capacity));
        let mut runners = Vec::with_capacity(workers.len());
        for (id, worker) in workers.into_iter().enumerate() {
            let (task_tx, task_rx) = crossbeam_channel::unbounded();
            let is_processing = Arc::new(AtomicBool::new(false));
            let available = Arc::new(AtomicBool::new(false));
            let join = std::thread::spawn({
                let factory = factory.clone();
                let task_rx = task_rx.clone();
                let is_processing = is_processing.clone();
                let available = available.clone();
                let on_complete = on_complete.clone();
                let on_stats_changed = on_stats_changed.clone();
                move || {
                    runner_loop(
                        id,
                        worker,
                        factory,
                        task_rx,
                        is_processing,
                        available,
                        warmup_timeout,
                        transcribe_timeout,
                        on_complete,
                        on_stats_changed,
                    )
                }
            });
            runners.push(RunnerHandle {
                task_tx: Some(task_tx),
                task_rx_for_len: task_rx,
                is_processing,
                available,
                join: Some(join),
            });
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let last_selected = Arc::new(AtomicUsize::new(0));

        let dispatch_intake = intake.clone();
        let dispatch_senders: Vec<_> = runners
            .iter()
            .map(|r| r.task_tx.as_ref().unwrap().clone())
            .collect();
        let dispatch_lens: Vec<_> = runners.iter().map(|r| r.task_rx_for_len.clone()).collect();
        let dispatch_processing: Vec<_> = runners.iter().map(|r| r.is_processing.clone()).collect();
        let dispatch_available: Vec<_> = runners.iter().map(|r| r.available.clone()).collect();
        let dispatch_shutdown = shutdown.clone();
        let dispatch_last_selected = last_selected.clone();
        let on_stats_changed_dispatch = on_stats_changed;

        let dispatcher = std::thread::spawn(move || loop {
            if dispatch_shutdown.load(Ordering::SeqCst) {
                break;
            }
            match dispatch_intake.doorbell().recv_timeout(Duration::from_millis(200)) {
                Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
            if dispatch_shutdown.load(Ordering::SeqCst) {
                break;
            }
            for task in dispatch_intake.drain() {
                let lens: Vec<usize> = dispatch_lens.iter().map(|r| r.len()).collect();
                let processing: Vec<bool> = dispatch_processing
                    .iter()
                    .map(|p| p.load(Ordering::SeqCst))
                    .collect();
                let available: Vec<bool> = dispatch_available
                    .iter()
                    .map(|a| a.load(Ordering::SeqCst))
                    .collect();
                let picked = select_runner(
                    &lens,
                    &processing,
                    &available,
                    dispatch_last_selected.load(Ordering::SeqCst),
                );
                dispatch_last_selected.store(picked, Ordering::SeqCst);
                let _ = dispatch_senders[picked].send(task);
                on_stats_changed_dispatch();
            }
        });

        Arc::new(Self {
            intake,
            runners,
            last_selected,
            dispatcher: Some(dispatcher),
            shutdown,
        })
    }

    pub fn intake(&self) -> &Arc<Intake> {
        &self.intake
    }

    pub fn runner_count(&self) -> usize {
        self.runners.len()
    }

    pub fn runner_queue_lens(&self) -> Vec<usize> {
        self.runners.iter().map(|r| r.task_rx_for_len.len()).collect()
    }

    pub fn runner_processing(&self) -> Vec<bool> {
        self.runners
            .iter()
            .map(|r| r.is_processing.load(Ordering::SeqCst))
            .collect()
    }

    pub fn runner_available(&self) -> Vec<bool> {
        self.runners
            .iter()
            .map(|r| r.available.load(Ordering::SeqCst))
            .collect()
    }
}

impl Drop for RunnerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.dispatcher.take() {
            let _ = join.join();
        }
        // Drop every runner's sender first so `task_rx.recv()` unblocks
        // with a disconnect error and each loop exits on its own.
        for runner in &mut self.runners {
            runner.task_tx.take();
        }
        for runner in &mut self.runners {
            if let Some(join) = runner.join.take() {
                let _ = join.join();
            }
        }
    }
}
