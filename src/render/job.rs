use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::composition::segmenter::{Segment, SourceClip};
use crate::composition::transitions::TransitionSpec;
use crate::error::BuildError;
use crate::sync::TransitionType;
use crate::timeline::types::TIME_EPSILON;

/// Containers the render pipeline knows how to produce
pub const SUPPORTED_FORMATS: [&str; 4] = ["mp4", "mov", "mkv", "webm"];

/// Bitrate preset for the exported file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    pub fn video_bitrate_kbps(&self) -> u32 {
        match self {
            QualityTier::Low => 1_000,
            QualityTier::Medium => 2_500,
            QualityTier::High => 5_000,
        }
    }

    pub fn audio_bitrate_kbps(&self) -> u32 {
        match self {
            QualityTier::Low => 128,
            QualityTier::Medium => 192,
            QualityTier::High => 320,
        }
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        QualityTier::Medium
    }
}

/// Target encoding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Container format (mp4, mov, mkv, webm)
    pub format: String,
    pub quality_tier: QualityTier,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30.0,
            format: "mp4".to_string(),
            quality_tier: QualityTier::Medium,
        }
    }
}

impl OutputSpec {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.width == 0 || self.height == 0 {
            return Err(BuildError::InvalidOutputSpec {
                details: format!("dimensions must be positive, got {}x{}", self.width, self.height),
            });
        }

        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(BuildError::InvalidOutputSpec {
                details: format!("fps must be positive, got {}", self.fps),
            });
        }

        if !SUPPORTED_FORMATS.contains(&self.format.as_str()) {
            return Err(BuildError::InvalidOutputSpec {
                details: format!("unsupported format '{}'", self.format),
            });
        }

        Ok(())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Soundtrack treatment applied across the whole timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMix {
    pub track_url: String,
    pub fade_in: f64,
    pub fade_out: f64,
    pub normalize: bool,
    pub volume: f64,
}

/// A single media operation for the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RenderOperation {
    /// Cut `[start, end)` out of a source for one segment
    ///
    /// A segment entered through a blend reads the blend's length past its
    /// own duration, so the overlap never shortens the timeline.
    Trim {
        segment: usize,
        source: String,
        start: f64,
        end: f64,
    },

    Scale {
        segment: usize,
        width: u32,
        height: u32,
    },

    /// Butt-join two neighbouring segments
    Concat { from: usize, to: usize },

    /// Blend two neighbouring segments
    ///
    /// `offset` is measured from where `from` starts on the timeline, so the
    /// blend ends on the boundary between the two segments.
    Transition {
        from: usize,
        to: usize,
        transition_type: TransitionType,
        duration: f64,
        offset: f64,
    },

    AudioMix {
        track_url: String,
        fade_in: f64,
        fade_out: f64,
        normalize: bool,
        volume: f64,
        /// Length of the timeline the track is bound to
        duration: f64,
    },

    Export { output: OutputSpec },
}

/// Metadata reported alongside a rendered artifact
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderSummary {
    pub duration_seconds: f64,
    pub segment_count: usize,
    pub transition_count: usize,
}

/// Fully resolved, ordered list of media operations
///
/// Built once per export request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    operations: Vec<RenderOperation>,
    output: OutputSpec,
}

impl RenderJob {
    pub fn operations(&self) -> &[RenderOperation] {
        &self.operations
    }

    pub fn output(&self) -> &OutputSpec {
        &self.output
    }

    /// Trim operations in segment order
    pub fn trims(&self) -> impl Iterator<Item = (usize, &str, f64, f64)> {
        self.operations.iter().filter_map(|op| match op {
            RenderOperation::Trim { segment, source, start, end } => Some((*segment, source.as_str(), *start, *end)),
            _ => None,
        })
    }

    pub fn scale_for(&self, segment: usize) -> Option<(u32, u32)> {
        self.operations.iter().find_map(|op| match op {
            RenderOperation::Scale { segment: s, width, height } if *s == segment => Some((*width, *height)),
            _ => None,
        })
    }

    pub fn audio_mix(&self) -> Option<&RenderOperation> {
        self.operations
            .iter()
            .find(|op| matches!(op, RenderOperation::AudioMix { .. }))
    }

    pub fn summary(&self) -> RenderSummary {
        let segment_count = self.trims().count();
        let transition_count = self
            .operations
            .iter()
            .filter(|op| matches!(op, RenderOperation::Transition { .. }))
            .count();

        RenderSummary {
            duration_seconds: self.output_duration(),
            segment_count,
            transition_count,
        }
    }

    /// Length of the encoded video
    ///
    /// Every blend overlaps exactly the lead-in its `to` segment reads, so
    /// this equals the timeline duration.
    pub fn output_duration(&self) -> f64 {
        let read: f64 = self.trims().map(|(_, _, start, end)| end - start).sum();
        let overlap: f64 = self
            .operations
            .iter()
            .map(|op| match op {
                RenderOperation::Transition { duration, .. } => *duration,
                _ => 0.0,
            })
            .sum();
        read - overlap
    }

    /// Output time at which each join starts, in join order
    ///
    /// A concat starts where the running stream ends. A blend starts
    /// `offset` past the end of the `from` input's lead-in.
    pub fn join_starts(&self) -> Vec<f64> {
        let lengths: Vec<f64> = self.trims().map(|(_, _, start, end)| end - start).collect();
        let length_of = |segment: usize| lengths.get(segment).copied().unwrap_or(0.0);

        let mut starts = Vec::new();
        let mut elapsed = length_of(0);
        let mut lead_in = 0.0;
        for op in &self.operations {
            match op {
                RenderOperation::Concat { to, .. } => {
                    starts.push(elapsed);
                    elapsed += length_of(*to);
                    lead_in = 0.0;
                }
                RenderOperation::Transition { from, to, duration, offset, .. } => {
                    let start = elapsed - length_of(*from) + lead_in + offset;
                    starts.push(start);
                    elapsed = start + length_of(*to);
                    lead_in = *duration;
                }
                _ => {}
            }
        }
        starts
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Lowers segments and transitions into a [`RenderJob`]
///
/// The builder is a pure function of its inputs: the same segments,
/// transitions, clips, soundtrack and output spec always produce the same
/// operation list.
pub struct RenderCommandBuilder {
    output: OutputSpec,
}

impl RenderCommandBuilder {
    pub fn new(output: OutputSpec) -> Self {
        Self { output }
    }

    pub fn build(
        &self,
        segments: &[Segment],
        transitions: &[TransitionSpec],
        clips: &[SourceClip],
        audio: &AudioMix,
    ) -> Result<RenderJob, BuildError> {
        self.output.validate()?;
        Self::check_transitions(segments, transitions)?;

        let mut operations = Vec::with_capacity(segments.len() * 3 + 2);

        // Extra source time each segment reads for the blend leading into it
        let lead_ins: Vec<f64> = std::iter::once(0.0)
            .chain(transitions.iter().map(|t| if t.is_visible() { t.duration_seconds } else { 0.0 }))
            .collect();

        for (segment, lead_in) in segments.iter().zip(&lead_ins) {
            let clip = clips
                .iter()
                .find(|c| c.id == segment.source_clip_id)
                .ok_or_else(|| BuildError::UnknownSourceClip {
                    segment: segment.index,
                    clip_id: segment.source_clip_id.clone(),
                })?;

            let start = clip.in_point();
            let needed = segment.duration() + lead_in;
            if let Some(available) = clip.available_duration() {
                if available + TIME_EPSILON < needed {
                    return Err(BuildError::ClipTooShort {
                        segment: segment.index,
                        clip_id: clip.id.clone(),
                        available,
                        needed,
                    });
                }
            }

            operations.push(RenderOperation::Trim {
                segment: segment.index,
                source: clip.url.clone(),
                start,
                end: start + needed,
            });

            if clip.resolution != Some(self.output.dimensions()) {
                operations.push(RenderOperation::Scale {
                    segment: segment.index,
                    width: self.output.width,
                    height: self.output.height,
                });
            }
        }

        for (pair, spec) in segments.windows(2).zip(transitions) {
            let (before, after) = (&pair[0], &pair[1]);
            let op = if spec.is_visible() {
                RenderOperation::Transition {
                    from: before.index,
                    to: after.index,
                    transition_type: spec.transition_type,
                    duration: spec.duration_seconds,
                    offset: before.duration() - spec.duration_seconds,
                }
            } else {
                RenderOperation::Concat { from: before.index, to: after.index }
            };
            operations.push(op);
        }

        let timeline_duration = segments.last().map(|s| s.end_time).unwrap_or(0.0);
        operations.push(RenderOperation::AudioMix {
            track_url: audio.track_url.clone(),
            fade_in: audio.fade_in,
            fade_out: audio.fade_out,
            normalize: audio.normalize,
            volume: audio.volume,
            duration: timeline_duration,
        });

        operations.push(RenderOperation::Export { output: self.output.clone() });

        let job = RenderJob { operations, output: self.output.clone() };
        let summary = job.summary();

        info!(
            "Built render job: {} segments, {} transitions, {} operations",
            summary.segment_count,
            summary.transition_count,
            job.operations.len()
        );
        debug!("Output: {}x{} @ {} fps, {} ({:?})",
               self.output.width, self.output.height, self.output.fps,
               self.output.format, self.output.quality_tier);

        Ok(job)
    }

    fn check_transitions(segments: &[Segment], transitions: &[TransitionSpec]) -> Result<(), BuildError> {
        let expected = segments.len().saturating_sub(1);
        if transitions.len() != expected {
            return Err(BuildError::MismatchedTransitions {
                details: format!("{} segments need {} transitions, got {}", segments.len(), expected, transitions.len()),
            });
        }

        for (index, (pair, spec)) in segments.windows(2).zip(transitions).enumerate() {
            if spec.segment_pair_index != index {
                return Err(BuildError::MismatchedTransitions {
                    details: format!("transition {} is bound to pair {}", index, spec.segment_pair_index),
                });
            }

            if !(spec.duration_seconds.is_finite() && spec.duration_seconds >= 0.0) {
                return Err(BuildError::MismatchedTransitions {
                    details: format!("transition {} has invalid duration {}", index, spec.duration_seconds),
                });
            }

            let limit = pair[0].duration().min(pair[1].duration()) / 2.0;
            if spec.is_visible() && spec.duration_seconds >= limit {
                return Err(BuildError::MismatchedTransitions {
                    details: format!(
                        "transition {} lasts {:.3}s but must stay under {:.3}s",
                        index, spec.duration_seconds, limit
                    ),
                });
            }
        }

        Ok(())
    }
}
