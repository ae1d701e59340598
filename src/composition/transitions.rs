use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::composition::segmenter::Segment;
use crate::sync::{SyncPolicy, TransitionType};

/// Share of the shorter neighbour a transition may occupy
const MAX_TRANSITION_SHARE: f64 = 0.25;

/// Transition between `segments[segment_pair_index]` and the segment after it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub segment_pair_index: usize,
    #[serde(rename = "type")]
    pub transition_type: TransitionType,
    pub duration_seconds: f64,
}

impl TransitionSpec {
    /// Whether this join needs a blend operation at render time
    pub fn is_visible(&self) -> bool {
        self.transition_type.is_blend() && self.duration_seconds > 0.0
    }
}

/// Assigns a transition to every adjacent segment pair
pub struct TransitionPlanner {
    transition_type: TransitionType,
    requested_duration: f64,
}

impl TransitionPlanner {
    pub fn new(transition_type: TransitionType, requested_duration: f64) -> Self {
        Self {
            transition_type,
            requested_duration: requested_duration.max(0.0),
        }
    }

    pub fn from_policy(policy: &SyncPolicy) -> Self {
        Self::new(policy.transition_type, policy.transition_duration)
    }

    /// One spec per join; nothing follows the final segment
    ///
    /// Durations are clamped to a quarter of the shorter neighbour, which keeps
    /// every transition under half of either segment.
    pub fn plan(&self, segments: &[Segment]) -> Vec<TransitionSpec> {
        let specs: Vec<TransitionSpec> = segments
            .windows(2)
            .enumerate()
            .map(|(index, pair)| TransitionSpec {
                segment_pair_index: index,
                transition_type: self.transition_type,
                duration_seconds: self.duration_for(&pair[0], &pair[1]),
            })
            .collect();

        debug!(
            "Planned {} {} transitions ({} visible)",
            specs.len(),
            self.transition_type,
            specs.iter().filter(|s| s.is_visible()).count()
        );

        specs
    }

    fn duration_for(&self, before: &Segment, after: &Segment) -> f64 {
        if !self.transition_type.is_blend() {
            return 0.0;
        }

        let shorter = before.duration().min(after.duration());
        self.requested_duration.min(MAX_TRANSITION_SHARE * shorter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::policy::DEFAULT_TRANSITION_DURATION;

    fn segments(bounds: &[f64]) -> Vec<Segment> {
        bounds
            .windows(2)
            .enumerate()
            .map(|(index, w)| Segment {
                index,
                start_time: w[0],
                end_time: w[1],
                source_clip_id: format!("clip{}", index),
            })
            .collect()
    }

    #[test]
    fn test_cut_has_zero_duration() {
        let planner = TransitionPlanner::new(TransitionType::Cut, DEFAULT_TRANSITION_DURATION);
        let specs = planner.plan(&segments(&[0.0, 4.0, 8.0, 10.0]));

        assert_eq!(specs.len(), 2);
        assert!(specs.iter().all(|s| s.duration_seconds == 0.0 && !s.is_visible()));
    }

    #[test]
    fn test_default_ceiling_is_half_a_second() {
        let planner = TransitionPlanner::new(TransitionType::Crossfade, DEFAULT_TRANSITION_DURATION);
        let specs = planner.plan(&segments(&[0.0, 4.0, 8.0]));

        assert_eq!(specs[0].duration_seconds, 0.5);
        assert_eq!(specs[0].transition_type, TransitionType::Crossfade);
    }

    #[test]
    fn test_short_neighbour_limits_duration() {
        let planner = TransitionPlanner::new(TransitionType::Fade, DEFAULT_TRANSITION_DURATION);
        let specs = planner.plan(&segments(&[0.0, 4.0, 5.0, 9.0]));

        assert_eq!(specs[0].duration_seconds, 0.25);
        assert_eq!(specs[1].duration_seconds, 0.25);
    }

    #[test]
    fn test_oversized_request_is_clamped() {
        let planner = TransitionPlanner::new(TransitionType::Slide, 3.0);
        let segs = segments(&[0.0, 2.0, 5.0]);
        let specs = planner.plan(&segs);

        let shorter = segs[0].duration().min(segs[1].duration());
        assert_eq!(specs[0].duration_seconds, 0.5);
        assert!(specs[0].duration_seconds < shorter / 2.0);
    }

    #[test]
    fn test_single_segment_has_no_transitions() {
        let planner = TransitionPlanner::new(TransitionType::Zoom, 0.5);
        assert!(planner.plan(&segments(&[0.0, 3.0])).is_empty());
    }

    #[test]
    fn test_planner_follows_policy() {
        let policy = SyncPolicy::default().with_transition(TransitionType::Zoom);
        let planner = TransitionPlanner::from_policy(&policy);
        let specs = planner.plan(&segments(&[0.0, 3.0, 6.0]));

        assert_eq!(specs[0].transition_type, TransitionType::Zoom);
        assert_eq!(specs[0].duration_seconds, 0.5);
    }
}
