//! Reorder buffer (spec §4.5): restores strict sequence order across
//! parallel transcription workers before handing segments to the sink.

use std::collections::HashMap;

/// Appended output (spec §3 "History segment"): a transcript fragment
/// already tagged with a speaker id by the pipeline orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySegment {
    pub timestamp: f64,
    pub speaker_id: u32,
    pub text: String,
    pub start_abs: f64,
    pub end_abs: f64,
}

/// Append-only sink for ordered history segments (spec §6 "Transcript
/// sink"). Must be cheap and non-blocking: `insert` on the reorder
/// buffer calls `append` synchronously on the completing runner's
/// thread (spec §9, Open Question resolved in SPEC_FULL §9).
pub trait TranscriptSink: Send {
    fn append(&mut self, segments: &[HistorySegment]);
}

/// Keeps a `Vec` of every segment it has seen, de-duplicating by
/// `end_abs > last_committed_end + EPSILON_SEC` (spec §3).
pub struct VecTranscriptSink {
    pub history: Vec<HistorySegment>,
    last_committed_end: f64,
}

pub const DEDUP_EPSILON_SEC: f64 = 0.05;

impl Default for VecTranscriptSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VecTranscriptSink {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            last_committed_end: f64::NEG_INFINITY,
        }
    }
}

impl TranscriptSink for VecTranscriptSink {
    fn append(&mut self, segments: &[HistorySegment]) {
        for seg in segments {
            if seg.end_abs > self.last_committed_end + DEDUP_EPSILON_SEC {
                self.last_committed_end = seg.end_abs;
                self.history.push(seg.clone());
            }
        }
    }
}

/// Holds per-window transcription results keyed by sequence number and
/// releases them strictly in order.
pub struct ReorderBuffer {
    pending: HashMap<u64, Vec<HistorySegment>>,
    next_expected: u64,
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_expected: 0,
        }
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Register a (possibly empty) result for `seq`, then flush every
    /// contiguous entry starting at `next_expected` into `sink`.
    pub fn insert(
        &mut self,
        seq: u64,
        segments: Vec<HistorySegment>,
        sink: &mut dyn TranscriptSink,
    ) {
        self.pending.insert(seq, segments);
        while let Some(segments) = self.pending.remove(&self.next_expected) {
            sink.append(&segments);
            self.next_expected += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(end: f64, text: &str) -> HistorySegment {
        HistorySegment {
            timestamp: end,
            speaker_id: 1,
            start_abs: end - 1.0,
            end_abs: end,
            text: text.to_string(),
        }
    }

    #[test]
    fn in_order_inserts_flush_immediately() {
        let mut rb = ReorderBuffer::new();
        let mut sink = VecTranscriptSink::new();
        rb.insert(0, vec![frag(1.0, "A")], &mut sink);
        rb.insert(1, vec![frag(2.0, "B")], &mut sink);
        assert_eq!(rb.next_expected(), 2);
        let texts: Vec<_> = sink.history.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[test]
    fn out_of_order_completion_still_sinks_in_sequence_order() {
        let mut rb = ReorderBuffer::new();
        let mut sink = VecTranscriptSink::new();
        // Worker 1 finishes seq 1 ("B") before worker 0 finishes seq 0 ("A").
        rb.insert(1, vec![frag(2.0, "B")], &mut sink);
        assert!(sink.history.is_empty(), "seq 1 must wait for seq 0");
        rb.insert(0, vec![frag(1.0, "A")], &mut sink);
        let texts: Vec<_> = sink.history.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[test]
    fn empty_result_still_advances_next_expected() {
        let mut rb = ReorderBuffer::new();
        let mut sink = VecTranscriptSink::new();
        rb.insert(0, vec![], &mut sink);
        rb.insert(1, vec![frag(2.0, "B")], &mut sink);
        assert_eq!(rb.next_expected(), 2);
        assert_eq!(sink.history.len(), 1);
    }

    #[test]
    fn dedup_drops_fragments_too_close_to_last_committed_end() {
        let mut sink = VecTranscriptSink::new();
        sink.append(&[frag(1.0, "A")]);
        // end_abs = 1.02 is within 50ms of 1.0, must be dropped.
        sink.append(&[HistorySegment {
            timestamp: 1.02,
            speaker_id: 1,
            start_abs: 0.9,
            end_abs: 1.02,
            text: "dup".into(),
        }]);
        assert_eq!(sink.history.len(), 1);
        sink.append(&[frag(1.2, "C")]);
        assert_eq!(sink.history.len(), 2);
    }

    #[test]
    fn gapless_sequence_no_repeats() {
        let mut rb = ReorderBuffer::new();
        let mut sink = VecTranscriptSink::new();
        for seq in (0..10).rev() {
            rb.insert(seq, vec![frag(seq as f64 + 1.0, "x")], &mut sink);
        }
        assert_eq!(rb.next_expected(), 10);
        assert_eq!(rb.pending_count(), 0);
    }
}
