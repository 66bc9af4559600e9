//! Global pause state machine (spec §4.1).
//!
//! Redesigned away from the source's cyclic controller/observer
//! references: the controller owns the state and publishes changes to
//! subscribers; nothing holds a back-reference to it.

use crate::vad::VadEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    None,
    Manual,
    AutoSilence,
}

struct Inner {
    state: PauseState,
    subscribers: Vec<crossbeam_channel::Sender<PauseState>>,
}

/// Thread-safe pause controller. Cheap to clone (shares inner state).
#[derive(Clone)]
pub struct PauseController {
    inner: Arc<Mutex<Inner>>,
}

impl Default for PauseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: PauseState::None,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn state(&self) -> PauseState {
        self.inner.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() != PauseState::None
    }

    /// Register for pause-state-change notifications. The returned
    /// receiver gets one message per transition (spec §4.1: "emits a
    /// single change event on transitions").
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<PauseState> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// User toggles manual pause on/off (spec §4.1 transition table).
    pub fn set_manual(&self, on: bool) {
        let mut inner = self.inner.lock();
        let new_state = match (inner.state, on) {
            (_, true) => PauseState::Manual,
            (PauseState::Manual, false) => PauseState::None,
            (other, false) => other,
        };
        Self::transition(&mut inner, new_state);
    }

    /// Feed a VAD edge event; applies auto-silence/auto-resume per the
    /// transition table, unless Manual (which dominates and ignores VAD).
    pub fn on_vad_event(&self, event: VadEvent) {
        let mut inner = self.inner.lock();
        let new_state = match (inner.state, event) {
            (PauseState::Manual, _) => PauseState::Manual,
            (PauseState::None, VadEvent::SilenceDetected) => PauseState::AutoSilence,
            (PauseState::AutoSilence, VadEvent::SpeechDetected) => PauseState::None,
            (other, _) => other,
        };
        Self::transition(&mut inner, new_state);
    }

    fn transition(inner: &mut Inner, new_state: PauseState) {
        if inner.state == new_state {
            return;
        }
        info!(from = ?inner.state, to = ?new_state, "pause state transition");
        inner.state = new_state;
        inner.subscribers.retain(|tx| tx.send(new_state).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_none() {
        let pc = PauseController::new();
        assert_eq!(pc.state(), PauseState::None);
        assert!(!pc.is_active());
    }

    #[test]
    fn manual_on_then_off() {
        let pc = PauseController::new();
        pc.set_manual(true);
        assert_eq!(pc.state(), PauseState::Manual);
        pc.set_manual(false);
        assert_eq!(pc.state(), PauseState::None);
    }

    #[test]
    fn manual_dominates_autosilence() {
        let pc = PauseController::new();
        pc.on_vad_event(VadEvent::SilenceDetected);
        assert_eq!(pc.state(), PauseState::AutoSilence);
        pc.set_manual(true);
        assert_eq!(pc.state(), PauseState::Manual);
        // VAD events while Manual are no-ops.
        pc.on_vad_event(VadEvent::SpeechDetected);
        assert_eq!(pc.state(), PauseState::Manual);
    }

    #[test]
    fn autosilence_resumes_on_speech() {
        let pc = PauseController::new();
        pc.on_vad_event(VadEvent::SilenceDetected);
        assert_eq!(pc.state(), PauseState::AutoSilence);
        pc.on_vad_event(VadEvent::SpeechDetected);
        assert_eq!(pc.state(), PauseState::None);
    }

    #[test]
    fn manual_off_from_none_is_noop() {
        let pc = PauseController::new();
        pc.set_manual(false);
        assert_eq!(pc.state(), PauseState::None);
    }

    #[test]
    fn subscriber_receives_one_event_per_transition() {
        let pc = PauseController::new();
        let rx = pc.subscribe();
        pc.set_manual(true);
        pc.set_manual(false);
        assert_eq!(rx.try_recv().unwrap(), PauseState::Manual);
        assert_eq!(rx.try_recv().unwrap(), PauseState::None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn no_event_emitted_for_unchanged_state() {
        let pc = PauseController::new();
        let rx = pc.subscribe();
        pc.set_manual(false); // already None, no-op
        assert!(rx.try_recv().is_err());
    }
}
