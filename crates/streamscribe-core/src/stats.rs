//! Observability surface (spec §6): `QueueStats` plus a
//! `QueueStatsChanged` notification channel.

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerStat {
    pub queue_count: usize,
    pub is_processing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub intake_count: usize,
    pub intake_cap: usize,
    pub per_runner: Vec<RunnerStat>,
    pub reorder_count: usize,
}

/// Fan-out notifier: every mutation that changes the numbers above calls
/// `notify()`, which fires a message to every subscriber (spec §6
/// "QueueStatsChanged event fires on every mutation").
#[derive(Clone, Default)]
pub struct StatsNotifier {
    subscribers: Arc<parking_lot::Mutex<Vec<crossbeam_channel::Sender<()>>>>,
}

impl StatsNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<()> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn notify(&self) {
        self.subscribers.lock().retain(|tx| tx.send(()).is_ok());
    }
}
