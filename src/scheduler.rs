use crate::SkipSegment;

/// A seek the scheduler wants performed.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipAction {
    pub segment_id: String,
    pub from_seconds: f64,
    pub target_seconds: f64,
}

/// Turns a position feed into at most one seek per segment.
///
/// Segments are checked in order of their start time, so when ranges overlap
/// the earliest-starting untriggered one wins. A fresh scheduler (or `reset`)
/// is needed for every session.
#[derive(Debug, Clone)]
pub struct SkipSegmentScheduler {
    segments: Vec<SkipSegment>,
    triggered: Vec<bool>,
    overshoot_secs: f64,
}

impl SkipSegmentScheduler {
    pub const DEFAULT_OVERSHOOT_SECS: f64 = 2.0;

    pub fn new(mut segments: Vec<SkipSegment>, overshoot_secs: f64) -> Self {
        segments.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
        let triggered = vec![false; segments.len()];
        Self {
            segments,
            triggered,
            overshoot_secs,
        }
    }

    /// Evaluates one tick. Returns the seek to perform, if any; the matching
    /// segment is marked triggered and never produces another action.
    pub fn on_tick(&mut self, position_seconds: f64) -> Option<SkipAction> {
        let index = self
            .segments
            .iter()
            .zip(&self.triggered)
            .position(|(segment, done)| !done && segment.contains(position_seconds))?;

        self.triggered[index] = true;
        let segment = &self.segments[index];
        Some(SkipAction {
            segment_id: segment.id.clone(),
            from_seconds: position_seconds,
            // Overshoot so seek imprecision cannot land us back inside the segment
            target_seconds: segment.end_seconds + self.overshoot_secs,
        })
    }

    pub fn is_triggered(&self, segment_id: &str) -> bool {
        self.segments
            .iter()
            .zip(&self.triggered)
            .any(|(segment, done)| *done && segment.id == segment_id)
    }

    pub fn triggered_count(&self) -> usize {
        self.triggered.iter().filter(|done| **done).count()
    }

    pub fn segments(&self) -> &[SkipSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn reset(&mut self) {
        self.triggered.iter_mut().for_each(|done| *done = false);
    }
}
