use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PlanningError;
use crate::sync::CutPlan;

/// Optional in/out points inside a source clip
///
/// `end` is the out-point in source time; playback never reads past it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrimHint {
    pub start: f64,
    pub end: Option<f64>,
}

/// Reference to a piece of source footage supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceClip {
    pub id: String,
    pub url: String,

    #[serde(default)]
    pub trim: Option<TrimHint>,

    /// Native resolution (width, height), if known
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,

    /// Relative weight for weighted selection
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl SourceClip {
    pub fn new<S: Into<String>, U: Into<String>>(id: S, url: U) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            trim: None,
            resolution: None,
            weight: default_weight(),
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some((width, height));
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_trim(mut self, start: f64, end: Option<f64>) -> Self {
        self.trim = Some(TrimHint { start, end });
        self
    }

    /// Where playback of this clip starts inside the source file
    pub fn in_point(&self) -> f64 {
        self.trim.map(|t| t.start.max(0.0)).unwrap_or(0.0)
    }

    /// Seconds playable between the in- and out-point, when an out-point is set
    pub fn available_duration(&self) -> Option<f64> {
        let end = self.trim?.end?;
        Some((end - self.in_point()).max(0.0))
    }
}

/// A contiguous span of output video mapped to one source clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub source_clip_id: String,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Strategy that picks a clip from the pool for each segment
///
/// Implementations must be deterministic for a given construction so that a
/// pipeline run can be reproduced.
pub trait ClipSelector: Send {
    /// Index into `pool` for the segment at `segment_index`
    fn select(&mut self, segment_index: usize, pool: &[SourceClip]) -> usize;
}

/// Cycles through the pool in order
#[derive(Debug, Default, Clone)]
pub struct RoundRobinSelector;

impl ClipSelector for RoundRobinSelector {
    fn select(&mut self, segment_index: usize, pool: &[SourceClip]) -> usize {
        segment_index % pool.len()
    }
}

/// Draws clips proportionally to their weights from a seeded RNG
pub struct WeightedSelector {
    distribution: WeightedIndex<f64>,
    rng: StdRng,
}

impl WeightedSelector {
    pub fn new(pool: &[SourceClip], seed: u64) -> Result<Self, PlanningError> {
        if let Some(clip) = pool.iter().find(|c| !(c.weight.is_finite() && c.weight >= 0.0)) {
            return Err(PlanningError::InsufficientSourceClips {
                reason: format!("clip '{}' has invalid weight {}", clip.id, clip.weight),
            });
        }

        let distribution = WeightedIndex::new(pool.iter().map(|c| c.weight)).map_err(|e| {
            PlanningError::InsufficientSourceClips {
                reason: format!("no selectable clip: {}", e),
            }
        })?;

        Ok(Self {
            distribution,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl ClipSelector for WeightedSelector {
    fn select(&mut self, _segment_index: usize, _pool: &[SourceClip]) -> usize {
        self.distribution.sample(&mut self.rng)
    }
}

/// Serializable choice of built-in selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionStrategy {
    RoundRobin,
    Weighted { seed: u64 },
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        SelectionStrategy::RoundRobin
    }
}

impl SelectionStrategy {
    pub fn selector(&self, pool: &[SourceClip]) -> Result<Box<dyn ClipSelector>, PlanningError> {
        match *self {
            SelectionStrategy::RoundRobin => Ok(Box::new(RoundRobinSelector)),
            SelectionStrategy::Weighted { seed } => Ok(Box::new(WeightedSelector::new(pool, seed)?)),
        }
    }
}

/// Maps cut plan boundaries onto source clips
pub struct ClipSegmenter<'a> {
    pool: &'a [SourceClip],
}

impl<'a> ClipSegmenter<'a> {
    pub fn new(pool: &'a [SourceClip]) -> Result<Self, PlanningError> {
        if pool.is_empty() {
            return Err(PlanningError::InsufficientSourceClips {
                reason: "source clip pool is empty".to_string(),
            });
        }
        Ok(Self { pool })
    }

    /// Build one segment per cut-plan gap
    ///
    /// Boundaries are shared between neighbours, so the segments tile the
    /// timeline with no gaps or overlaps. A selector that picks an index
    /// outside the pool fails with `InsufficientSourceClips`.
    pub fn segment(&self, plan: &CutPlan, selector: &mut dyn ClipSelector) -> Result<Vec<Segment>, PlanningError> {
        let boundaries = plan.boundaries();

        boundaries
            .windows(2)
            .enumerate()
            .map(|(index, bounds)| -> Result<Segment, PlanningError> {
                let picked = selector.select(index, self.pool);
                let clip = self.pool.get(picked).ok_or_else(|| PlanningError::InsufficientSourceClips {
                    reason: format!(
                        "selector picked clip {} for segment {} from a pool of {}",
                        picked, index, self.pool.len()
                    ),
                })?;
                debug!(
                    "Segment {}: {:.3}s-{:.3}s -> clip '{}'",
                    index, bounds[0], bounds[1], clip.id
                );
                Ok(Segment {
                    index,
                    start_time: bounds[0],
                    end_time: bounds[1],
                    source_clip_id: clip.id.clone(),
                })
            })
            .collect()
    }

    /// Look up a clip by id
    pub fn clip(&self, id: &str) -> Option<&'a SourceClip> {
        self.pool.iter().find(|c| c.id == id)
    }
}
