use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, PlanningError};

/// Platform-wide ceiling on any single clip, whatever the preset asks for
pub const HARD_MAX_CLIP_DURATION: f64 = 5.0;

/// Default ceiling on a transition's length
pub const DEFAULT_TRANSITION_DURATION: f64 = 0.5;

/// Visual treatment applied across a cut boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    /// Hard cut, no blending
    Cut,
    Crossfade,
    /// Dip through black
    Fade,
    Slide,
    Zoom,
}

impl TransitionType {
    pub const ALL: [TransitionType; 5] = [
        TransitionType::Cut,
        TransitionType::Crossfade,
        TransitionType::Fade,
        TransitionType::Slide,
        TransitionType::Zoom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransitionType::Cut => "cut",
            TransitionType::Crossfade => "crossfade",
            TransitionType::Fade => "fade",
            TransitionType::Slide => "slide",
            TransitionType::Zoom => "zoom",
        }
    }

    pub fn is_blend(&self) -> bool {
        *self != TransitionType::Cut
    }
}

impl Default for TransitionType {
    fn default() -> Self {
        TransitionType::Cut
    }
}

impl fmt::Display for TransitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransitionType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| BuildError::UnsupportedTransition { name: s.to_string() })
    }
}

/// Editing presets, each authored with its own clip-length range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutStyle {
    Phrases,
    RandomBars,
    Dynamic,
    Slow,
    Cinematic,
    MusicVideo,
    Narrative,
    Experimental,
    Rhythmic,
    Minimalist,
    Balanced,
    Melodic,
}

impl CutStyle {
    pub const ALL: [CutStyle; 12] = [
        CutStyle::Phrases,
        CutStyle::RandomBars,
        CutStyle::Dynamic,
        CutStyle::Slow,
        CutStyle::Cinematic,
        CutStyle::MusicVideo,
        CutStyle::Narrative,
        CutStyle::Experimental,
        CutStyle::Rhythmic,
        CutStyle::Minimalist,
        CutStyle::Balanced,
        CutStyle::Melodic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CutStyle::Phrases => "phrases",
            CutStyle::RandomBars => "random_bars",
            CutStyle::Dynamic => "dynamic",
            CutStyle::Slow => "slow",
            CutStyle::Cinematic => "cinematic",
            CutStyle::MusicVideo => "music_video",
            CutStyle::Narrative => "narrative",
            CutStyle::Experimental => "experimental",
            CutStyle::Rhythmic => "rhythmic",
            CutStyle::Minimalist => "minimalist",
            CutStyle::Balanced => "balanced",
            CutStyle::Melodic => "melodic",
        }
    }

    /// `(min, max)` clip length in seconds
    pub fn duration_range(&self) -> (f64, f64) {
        match self {
            CutStyle::Phrases => (4.0, 5.0),
            CutStyle::RandomBars => (2.0, 5.0),
            CutStyle::Dynamic => (1.5, 4.0),
            CutStyle::Slow => (5.0, 5.0),
            CutStyle::Cinematic => (3.0, 5.0),
            CutStyle::MusicVideo => (1.0, 3.0),
            CutStyle::Narrative => (4.0, 5.0),
            CutStyle::Experimental => (1.0, 5.0),
            CutStyle::Rhythmic => (1.0, 2.0),
            CutStyle::Minimalist => (5.0, 5.0),
            CutStyle::Balanced => (2.0, 4.0),
            CutStyle::Melodic => (3.0, 5.0),
        }
    }
}

impl fmt::Display for CutStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CutStyle {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|style| style.name() == wanted)
            .ok_or_else(|| PlanningError::InvalidPolicy {
                reason: format!("unknown cut style '{}'", s),
            })
    }
}

/// Immutable scheduling constraints for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// Place cuts on detected beats; when false beats are ignored entirely
    pub cut_on_beats: bool,

    pub prioritize_downbeats: bool,

    /// Shortest allowed clip in seconds
    pub min_clip_duration: f64,

    /// Longest allowed clip in seconds (at most [`HARD_MAX_CLIP_DURATION`])
    pub max_clip_duration: f64,

    /// Minimum beat intensity to count as a strong candidate (0.0-1.0)
    pub intensity_threshold: f64,

    pub transition_type: TransitionType,

    /// Requested transition length; the planner clamps it per segment pair
    pub transition_duration: f64,

    /// Skip weak beats and force cuts at the maximum length instead
    pub allow_beat_skipping: bool,

    /// Preset the duration range came from, if any
    pub cut_style: Option<CutStyle>,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            cut_on_beats: true,
            prioritize_downbeats: true,
            min_clip_duration: 1.5,
            max_clip_duration: HARD_MAX_CLIP_DURATION,
            intensity_threshold: 0.5,
            transition_type: TransitionType::Cut,
            transition_duration: DEFAULT_TRANSITION_DURATION,
            allow_beat_skipping: true,
            cut_style: None,
        }
    }
}

impl SyncPolicy {
    /// Default policy with the preset's duration range applied
    pub fn for_style(style: CutStyle) -> Self {
        Self::default().with_style(style)
    }

    /// Apply a preset's duration range, clamping the maximum to the hard cap
    pub fn with_style(mut self, style: CutStyle) -> Self {
        let (min, max) = style.duration_range();
        self.max_clip_duration = max.min(HARD_MAX_CLIP_DURATION);
        self.min_clip_duration = min.min(self.max_clip_duration);
        self.cut_style = Some(style);
        self
    }

    pub fn with_transition(mut self, transition_type: TransitionType) -> Self {
        self.transition_type = transition_type;
        self
    }

    /// Validate the policy before any scheduling work
    pub fn validate(&self) -> Result<(), PlanningError> {
        let invalid = |reason: String| Err(PlanningError::InvalidPolicy { reason });

        if !(self.min_clip_duration.is_finite() && self.min_clip_duration > 0.0) {
            return invalid(format!("min_clip_duration must be positive, got {}", self.min_clip_duration));
        }

        if !self.max_clip_duration.is_finite() || self.min_clip_duration > self.max_clip_duration {
            return invalid(format!(
                "min_clip_duration {} exceeds max_clip_duration {}",
                self.min_clip_duration, self.max_clip_duration
            ));
        }

        if self.max_clip_duration > HARD_MAX_CLIP_DURATION {
            return invalid(format!(
                "max_clip_duration {} exceeds the {}s cap",
                self.max_clip_duration, HARD_MAX_CLIP_DURATION
            ));
        }

        if !(0.0..=1.0).contains(&self.intensity_threshold) {
            return invalid(format!("intensity_threshold {} outside [0, 1]", self.intensity_threshold));
        }

        if !(self.transition_duration.is_finite() && self.transition_duration >= 0.0) {
            return invalid(format!("transition_duration must be non-negative, got {}", self.transition_duration));
        }

        Ok(())
    }
}
