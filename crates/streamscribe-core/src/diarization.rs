//! Speaker labeling (spec §9.1 supplement): the core ships a
//! `SpeakerLabeler` seam so a caller can attach speaker ids to emitted
//! segments, without committing to any particular diarization engine.

/// A caller-supplied speaker interval, in absolute stream time (spec
/// §4.7: the join happens against the same clock the history segment's
/// `start_abs`/`end_abs` are stamped in).
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerInterval {
    pub start_abs: f64,
    pub end_abs: f64,
    pub speaker_id: u32,
}

pub trait SpeakerLabeler: Send {
    /// Return the speaker id for the absolute-time span `[start_abs, end_abs]`.
    fn label(&self, start_abs: f64, end_abs: f64) -> u32;
}

/// Default labeler: every segment belongs to speaker 1 (spec's Open
/// Question resolution — single-speaker is the baseline when no
/// diarization input is supplied).
#[derive(Default)]
pub struct SingleSpeaker;

impl SpeakerLabeler for SingleSpeaker {
    fn label(&self, _start_abs: f64, _end_abs: f64) -> u32 {
        1
    }
}

/// Joins segments against externally-supplied speaker intervals by
/// maximum temporal overlap, in absolute stream time. Falls back to `1`
/// if no interval overlaps the segment at all.
pub struct OverlapLabeler {
    intervals: Vec<SpeakerInterval>,
}

impl OverlapLabeler {
    pub fn new(intervals: Vec<SpeakerInterval>) -> Self {
        Self { intervals }
    }

    fn overlap_sec(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
        (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
    }
}

impl SpeakerLabeler for OverlapLabeler {
    fn label(&self, start_abs: f64, end_abs: f64) -> u32 {
        self.intervals
            .iter()
            .map(|iv| {
                (
                    Self::overlap_sec(start_abs, end_abs, iv.start_abs, iv.end_abs),
                    iv.speaker_id,
                )
            })
            .filter(|(overlap, _)| *overlap > 0.0)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, speaker_id)| speaker_id)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_speaker_always_returns_one() {
        let labeler = SingleSpeaker;
        assert_eq!(labeler.label(0.0, 1.0), 1);
        assert_eq!(labeler.label(10.0, 20.0), 1);
    }

    #[test]
    fn overlap_labeler_picks_max_overlap_speaker() {
        let labeler = OverlapLabeler::new(vec![
            SpeakerInterval {
                start_abs: 0.0,
                end_abs: 1.0,
                speaker_id: 2,
            },
            SpeakerInterval {
                start_abs: 0.8,
                end_abs: 3.0,
                speaker_id: 3,
            },
        ]);
        // [0.5, 2.5] overlaps speaker 2 for 0.5s and speaker 3 for 1.7s.
        assert_eq!(labeler.label(0.5, 2.5), 3);
    }

    #[test]
    fn overlap_labeler_falls_back_to_one_with_no_overlap() {
        let labeler = OverlapLabeler::new(vec![SpeakerInterval {
            start_abs: 5.0,
            end_abs: 6.0,
            speaker_id: 2,
        }]);
        assert_eq!(labeler.label(0.0, 1.0), 1);
    }

    /// The whole point of joining in absolute time: two windows whose
    /// *local* clocks both restart at 0 must not be confused with each
    /// other just because their local offsets coincide.
    #[test]
    fn overlap_labeler_distinguishes_windows_with_coinciding_local_offsets() {
        let labeler = OverlapLabeler::new(vec![
            SpeakerInterval {
                start_abs: 0.0,
                end_abs: 3.0,
                speaker_id: 1,
            },
            SpeakerInterval {
                start_abs: 10.0,
                end_abs: 13.0,
                speaker_id: 2,
            },
        ]);
        // Both segments are "[0.5, 1.5]" in window-local terms, but the
        // second window started at absolute t=10.0.
        assert_eq!(labeler.label(0.5, 1.5), 1);
        assert_eq!(labeler.label(10.5, 11.5), 2);
    }
}
