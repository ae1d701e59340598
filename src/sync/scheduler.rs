use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PlanningError;
use crate::sync::policy::SyncPolicy;
use crate::timeline::types::TIME_EPSILON;
use crate::timeline::{Beat, BeatRef, BeatTimeline};

/// Why a cut landed where it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutReason {
    /// Placed on a detected beat
    Beat,

    /// No usable beat, cut at the minimum clip length
    ForcedMin,

    /// No usable beat, cut at the maximum clip length
    ForcedMax,

    /// Terminal point at the end of the timeline
    End,
}

/// A timestamp where the output switches segments
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutPoint {
    pub time: f64,
    pub source_beat: Option<BeatRef>,
    pub reason: CutReason,
}

impl CutPoint {
    fn on_beat(index: usize, beat: &Beat) -> Self {
        Self {
            time: beat.time,
            source_beat: Some(BeatRef { index, beat_type: beat.beat_type }),
            reason: CutReason::Beat,
        }
    }

    fn forced(time: f64, reason: CutReason) -> Self {
        Self { time, source_beat: None, reason }
    }
}

/// Ordered cut points covering `[0, duration]`
///
/// The origin is implicit: the first point is the end of the first segment
/// and the last point is always the [`CutReason::End`] point at `duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutPlan {
    points: Vec<CutPoint>,
    duration: f64,
}

impl CutPlan {
    pub fn points(&self) -> &[CutPoint] {
        &self.points
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Cut times, terminal point included
    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.time).collect()
    }

    /// Segment boundaries starting at the implicit origin
    pub fn boundaries(&self) -> Vec<f64> {
        std::iter::once(0.0).chain(self.points.iter().map(|p| p.time)).collect()
    }

    /// Length of each segment the plan describes
    pub fn gaps(&self) -> Vec<f64> {
        self.boundaries().windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn segment_count(&self) -> usize {
        self.points.len()
    }

    /// Number of cuts placed on a beat
    pub fn beat_aligned_count(&self) -> usize {
        self.points.iter().filter(|p| p.reason == CutReason::Beat).count()
    }
}

/// Greedy forward-scan cut scheduler
///
/// From the current cursor the scheduler looks at beats inside
/// `[cursor + min, cursor + max]` and picks, in order of preference, the
/// earliest downbeat (when downbeats are prioritised), the earliest beat at or
/// above the intensity threshold, or (when skipping is disallowed) the earliest
/// beat of any kind. An empty choice forces a cut at `cursor + max` when beat
/// skipping is allowed and at `cursor + min` otherwise.
pub struct CutScheduler {
    policy: SyncPolicy,
}

impl CutScheduler {
    pub fn new(policy: SyncPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Produce the cut plan for a timeline
    pub fn schedule(&self, timeline: &BeatTimeline) -> Result<CutPlan, PlanningError> {
        self.policy.validate()?;

        let duration = timeline.duration();
        let mut points = Vec::new();

        if duration < self.policy.min_clip_duration {
            debug!(
                "Timeline ({:.2}s) shorter than minimum clip ({:.2}s), using a single segment",
                duration, self.policy.min_clip_duration
            );
        } else if !self.policy.cut_on_beats {
            self.schedule_uniform(duration, &mut points);
        } else {
            self.schedule_on_beats(timeline, &mut points);
        }

        points.push(CutPoint::forced(duration, CutReason::End));

        let plan = CutPlan { points, duration };

        info!(
            "Scheduled {} segments over {:.2}s ({} on beats)",
            plan.segment_count(),
            duration,
            plan.beat_aligned_count()
        );

        Ok(plan)
    }

    /// Cuts at exact multiples of the maximum clip length
    fn schedule_uniform(&self, duration: f64, points: &mut Vec<CutPoint>) {
        let max = self.policy.max_clip_duration;

        for k in 1.. {
            let time = k as f64 * max;
            if time >= duration - TIME_EPSILON {
                break;
            }
            points.push(CutPoint::forced(time, CutReason::ForcedMax));
        }
    }

    fn schedule_on_beats(&self, timeline: &BeatTimeline, points: &mut Vec<CutPoint>) {
        let duration = timeline.duration();
        let min = self.policy.min_clip_duration;
        let max = self.policy.max_clip_duration;

        let mut cursor = 0.0;

        while cursor < duration - min {
            let window: Vec<(usize, &Beat)> = timeline
                .beats_in_range(cursor + min - TIME_EPSILON, cursor + max + TIME_EPSILON)
                .filter(|(_, beat)| beat.time < duration - TIME_EPSILON)
                .collect();

            let point = match self.pick_candidate(&window) {
                Some((index, beat)) => CutPoint::on_beat(index, beat),
                None if self.policy.allow_beat_skipping => {
                    let time = cursor + max;
                    if time >= duration - TIME_EPSILON {
                        // the end point closes a final segment no longer than max
                        break;
                    }
                    CutPoint::forced(time, CutReason::ForcedMax)
                }
                None => {
                    let time = cursor + min;
                    if time >= duration - TIME_EPSILON {
                        break;
                    }
                    CutPoint::forced(time, CutReason::ForcedMin)
                }
            };

            debug!(
                "Cut at {:.3}s ({:?}, window had {} beats)",
                point.time,
                point.reason,
                window.len()
            );

            cursor = point.time;
            points.push(point);
        }
    }

    /// Pick the preferred beat from a time-ordered window
    fn pick_candidate<'a>(&self, window: &[(usize, &'a Beat)]) -> Option<(usize, &'a Beat)> {
        if self.policy.prioritize_downbeats {
            if let Some(candidate) = window.iter().find(|(_, beat)| beat.is_downbeat()) {
                return Some(*candidate);
            }
        }

        if let Some(candidate) = window
            .iter()
            .find(|(_, beat)| beat.intensity >= self.policy.intensity_threshold)
        {
            return Some(*candidate);
        }

        if !self.policy.allow_beat_skipping {
            return window.first().copied();
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::BeatType;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn integer_beats(duration: u32, downbeat_every: u32, intensity: f64) -> BeatTimeline {
        let beats = (1..=duration)
            .map(|t| {
                let beat_type = if t % downbeat_every == 0 { BeatType::Downbeat } else { BeatType::Regular };
                Beat::new(t as f64, beat_type, intensity, 0.5)
            })
            .collect();
        BeatTimeline::new(beats, 60.0, "4/4", duration as f64).unwrap()
    }

    fn random_timeline(rng: &mut StdRng) -> BeatTimeline {
        let duration = rng.gen_range(0.5..90.0);
        let count = rng.gen_range(0..200);
        let beats = (0..count)
            .map(|_| {
                let beat_type = match rng.gen_range(0..3) {
                    0 => BeatType::Downbeat,
                    1 => BeatType::Accent,
                    _ => BeatType::Regular,
                };
                Beat::new(rng.gen_range(0.0..=duration), beat_type, rng.gen_range(0.0..=1.0), rng.gen_range(0.0..=1.0))
            })
            .collect();
        BeatTimeline::new(beats, 120.0, "4/4", duration).unwrap()
    }

    fn random_policy(rng: &mut StdRng) -> SyncPolicy {
        let max = rng.gen_range(0.5..=5.0);
        let min = rng.gen_range(0.1..=max);
        SyncPolicy {
            cut_on_beats: rng.gen_bool(0.8),
            prioritize_downbeats: rng.gen_bool(0.5),
            min_clip_duration: min,
            max_clip_duration: max,
            intensity_threshold: rng.gen_range(0.0..=1.0),
            allow_beat_skipping: rng.gen_bool(0.5),
            ..SyncPolicy::default()
        }
    }

    #[test]
    fn test_first_cut_lands_on_first_downbeat() {
        let timeline = integer_beats(30, 4, 0.6);
        let policy = SyncPolicy {
            min_clip_duration: 1.5,
            max_clip_duration: 5.0,
            prioritize_downbeats: true,
            ..SyncPolicy::default()
        };

        let plan = CutScheduler::new(policy).schedule(&timeline).unwrap();
        let first = plan.points()[0];

        assert_eq!(first.time, 4.0);
        assert_eq!(first.reason, CutReason::Beat);
        assert_eq!(first.source_beat.map(|b| b.beat_type), Some(BeatType::Downbeat));
        assert_eq!(plan.times(), vec![4.0, 8.0, 12.0, 16.0, 20.0, 24.0, 28.0, 30.0]);
    }

    #[test]
    fn test_forced_min_without_beats() {
        let timeline = BeatTimeline::new(vec![], 120.0, "4/4", 10.0).unwrap();
        let policy = SyncPolicy {
            cut_on_beats: true,
            allow_beat_skipping: false,
            min_clip_duration: 2.0,
            max_clip_duration: 4.0,
            ..SyncPolicy::default()
        };

        let plan = CutScheduler::new(policy).schedule(&timeline).unwrap();

        assert_eq!(plan.times(), vec![2.0, 4.0, 6.0, 8.0, 10.0]);
        assert!(plan.points()[..4].iter().all(|p| p.reason == CutReason::ForcedMin));
        assert_eq!(plan.points()[4].reason, CutReason::End);
    }

    #[test]
    fn test_forced_max_when_skipping_allowed() {
        let timeline = BeatTimeline::new(vec![], 120.0, "4/4", 10.0).unwrap();
        let policy = SyncPolicy {
            min_clip_duration: 2.0,
            max_clip_duration: 4.0,
            ..SyncPolicy::default()
        };

        let plan = CutScheduler::new(policy).schedule(&timeline).unwrap();
        assert_eq!(plan.times(), vec![4.0, 8.0, 10.0]);
    }

    #[test]
    fn test_inverted_policy_fails_before_scheduling() {
        let timeline = integer_beats(10, 4, 0.6);
        let policy = SyncPolicy {
            min_clip_duration: 5.0,
            max_clip_duration: 3.0,
            ..SyncPolicy::default()
        };

        let result = CutScheduler::new(policy).schedule(&timeline);
        assert!(matches!(result, Err(PlanningError::InvalidPolicy { .. })));
    }

    #[test]
    fn test_short_timeline_is_a_single_segment() {
        let timeline = BeatTimeline::new(vec![Beat::new(0.5, BeatType::Downbeat, 1.0, 1.0)], 120.0, "4/4", 1.0).unwrap();
        let plan = CutScheduler::new(SyncPolicy::default()).schedule(&timeline).unwrap();

        assert_eq!(plan.times(), vec![1.0]);
        assert_eq!(plan.boundaries(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_uniform_spacing_when_not_cutting_on_beats() {
        let timeline = integer_beats(13, 4, 0.9);
        let policy = SyncPolicy {
            cut_on_beats: false,
            max_clip_duration: 3.0,
            ..SyncPolicy::default()
        };

        let plan = CutScheduler::new(policy).schedule(&timeline).unwrap();
        assert_eq!(plan.times(), vec![3.0, 6.0, 9.0, 12.0, 13.0]);
        assert!(plan.points().iter().all(|p| p.source_beat.is_none()));
    }

    #[test]
    fn test_intensity_threshold_when_downbeats_not_prioritised() {
        let beats = vec![
            Beat::new(2.0, BeatType::Downbeat, 0.2, 0.5),
            Beat::new(2.5, BeatType::Regular, 0.8, 0.5),
            Beat::new(3.0, BeatType::Accent, 0.9, 0.5),
        ];
        let timeline = BeatTimeline::new(beats, 120.0, "4/4", 10.0).unwrap();
        let policy = SyncPolicy {
            prioritize_downbeats: false,
            min_clip_duration: 2.0,
            max_clip_duration: 4.0,
            ..SyncPolicy::default()
        };

        let plan = CutScheduler::new(policy).schedule(&timeline).unwrap();
        assert_eq!(plan.points()[0].time, 2.5);
    }

    #[test]
    fn test_weak_beat_taken_only_when_skipping_disallowed() {
        let beats = vec![Beat::new(2.5, BeatType::Regular, 0.1, 0.1)];
        let timeline = BeatTimeline::new(beats, 120.0, "4/4", 10.0).unwrap();
        let base = SyncPolicy {
            min_clip_duration: 2.0,
            max_clip_duration: 4.0,
            intensity_threshold: 0.5,
            ..SyncPolicy::default()
        };

        let skipping = CutScheduler::new(base.clone()).schedule(&timeline).unwrap();
        assert_eq!(skipping.points()[0].time, 4.0);
        assert_eq!(skipping.points()[0].reason, CutReason::ForcedMax);

        let strict = SyncPolicy { allow_beat_skipping: false, ..base };
        let plan = CutScheduler::new(strict).schedule(&timeline).unwrap();
        assert_eq!(plan.points()[0].time, 2.5);
        assert_eq!(plan.points()[0].reason, CutReason::Beat);
    }

    #[test]
    fn test_beat_at_timeline_end_is_not_a_cut() {
        let beats = vec![Beat::new(6.0, BeatType::Downbeat, 1.0, 1.0)];
        let timeline = BeatTimeline::new(beats, 120.0, "4/4", 6.0).unwrap();
        let policy = SyncPolicy {
            min_clip_duration: 2.0,
            max_clip_duration: 4.0,
            ..SyncPolicy::default()
        };

        let plan = CutScheduler::new(policy).schedule(&timeline).unwrap();
        assert_eq!(plan.times(), vec![4.0, 6.0]);
    }

    #[test]
    fn test_scheduling_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let timeline = random_timeline(&mut rng);
            let policy = random_policy(&mut rng);
            let scheduler = CutScheduler::new(policy);
            assert_eq!(scheduler.schedule(&timeline).unwrap(), scheduler.schedule(&timeline).unwrap());
        }
    }

    #[test]
    fn test_plan_invariants_hold_for_random_inputs() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..500 {
            let timeline = random_timeline(&mut rng);
            let policy = random_policy(&mut rng);
            let plan = CutScheduler::new(policy.clone()).schedule(&timeline).unwrap();

            let times = plan.times();
            assert!(times.windows(2).all(|w| w[0] < w[1]), "times not increasing: {:?}", times);
            assert_eq!(*times.last().unwrap(), timeline.duration());
            assert_eq!(plan.points().last().unwrap().reason, CutReason::End);

            let gaps = plan.gaps();
            let (last, rest) = gaps.split_last().unwrap();
            for gap in rest {
                assert!(*gap >= policy.min_clip_duration - 1e-5, "gap {} < min {:?}", gap, policy);
                assert!(*gap <= policy.max_clip_duration + 1e-5, "gap {} > max {:?}", gap, policy);
            }
            assert!(*last <= policy.max_clip_duration + 1e-6 || gaps.len() == 1);
            assert!(*last > 0.0);

            let covered: f64 = gaps.iter().sum();
            assert!((covered - timeline.duration()).abs() < 1e-6);

            if !policy.cut_on_beats {
                for (k, time) in times[..times.len() - 1].iter().enumerate() {
                    assert_eq!(*time, (k + 1) as f64 * policy.max_clip_duration);
                }
            }
        }
    }
}
