use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, PlanningError, Result};
use crate::sync::SyncPolicy;

/// Beats closer together than this are treated as the same timestamp
pub const TIME_EPSILON: f64 = 1e-6;

/// Classification of beat types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeatType {
    /// First/strongest beat of a bar
    Downbeat,

    /// Emphasised beat that is not a downbeat
    Accent,

    #[serde(alias = "beat")]
    Regular,
}

/// Individual detected beat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    /// Time of the beat in seconds
    pub time: f64,

    #[serde(rename = "type")]
    pub beat_type: BeatType,

    /// Detection strength (0.0-1.0)
    pub intensity: f64,

    /// Local energy around this beat (0.0-1.0)
    pub energy: f64,
}

impl Beat {
    pub fn new(time: f64, beat_type: BeatType, intensity: f64, energy: f64) -> Self {
        Self { time, beat_type, intensity, energy }
    }

    pub fn is_downbeat(&self) -> bool {
        self.beat_type == BeatType::Downbeat
    }
}

/// Reference to a beat inside a [`BeatTimeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatRef {
    /// Index into [`BeatTimeline::beats`]
    pub index: usize,
    pub beat_type: BeatType,
}

/// Time signature information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    /// Beats per measure (numerator)
    pub beats_per_measure: u8,

    /// Note value for beat (denominator, e.g., 4 for quarter note)
    pub beat_note_value: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats_per_measure: 4,
            beat_note_value: 4,
        }
    }
}

impl FromStr for TimeSignature {
    type Err = PlanningError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || PlanningError::InvalidTimeline {
            details: format!("unparseable time signature '{}'", s),
        };

        let (num, denom) = s.trim().split_once('/').ok_or_else(invalid)?;
        let beats_per_measure: u8 = num.trim().parse().map_err(|_| invalid())?;
        let beat_note_value: u8 = denom.trim().parse().map_err(|_| invalid())?;

        if beats_per_measure == 0 || beat_note_value == 0 || !beat_note_value.is_power_of_two() {
            return Err(invalid());
        }

        Ok(Self { beats_per_measure, beat_note_value })
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.beats_per_measure, self.beat_note_value)
    }
}

/// Validated, ordered beat timeline
///
/// Construction sorts beats by time and collapses colliding timestamps,
/// keeping the more intense beat (the first one ingested wins a tie).
#[derive(Debug, Clone, PartialEq)]
pub struct BeatTimeline {
    beats: Vec<Beat>,
    bpm: f64,
    time_signature: TimeSignature,
    duration: f64,
}

impl BeatTimeline {
    pub fn new(
        beats: Vec<Beat>,
        bpm: f64,
        time_signature: &str,
        duration: f64,
    ) -> std::result::Result<Self, PlanningError> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(PlanningError::InvalidTimeline {
                details: format!("bpm must be positive, got {}", bpm),
            });
        }

        if !(duration.is_finite() && duration > 0.0) {
            return Err(PlanningError::InvalidTimeline {
                details: format!("duration must be positive, got {}", duration),
            });
        }

        let time_signature = time_signature.parse()?;

        for beat in &beats {
            Self::check_beat(beat, duration)?;
        }

        let ingested = beats.len();
        let beats = Self::normalize(beats);

        if beats.len() < ingested {
            debug!("Collapsed {} colliding beats", ingested - beats.len());
        }

        Ok(Self { beats, bpm, time_signature, duration })
    }

    fn check_beat(beat: &Beat, duration: f64) -> std::result::Result<(), PlanningError> {
        if !beat.time.is_finite() || beat.time < 0.0 || beat.time > duration {
            return Err(PlanningError::InvalidTimeline {
                details: format!("beat time {} outside [0, {}]", beat.time, duration),
            });
        }

        if !(0.0..=1.0).contains(&beat.intensity) {
            return Err(PlanningError::InvalidTimeline {
                details: format!("beat intensity {} at {:.3}s outside [0, 1]", beat.intensity, beat.time),
            });
        }

        if !(0.0..=1.0).contains(&beat.energy) {
            return Err(PlanningError::InvalidTimeline {
                details: format!("beat energy {} at {:.3}s outside [0, 1]", beat.energy, beat.time),
            });
        }

        Ok(())
    }

    /// Stable sort by time, then keep the strongest beat of each collision
    fn normalize(mut beats: Vec<Beat>) -> Vec<Beat> {
        beats.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut normalized: Vec<Beat> = Vec::with_capacity(beats.len());
        for beat in beats {
            match normalized.last_mut() {
                Some(last) if (beat.time - last.time).abs() < TIME_EPSILON => {
                    if beat.intensity > last.intensity {
                        *last = beat;
                    }
                }
                _ => normalized.push(beat),
            }
        }

        normalized
    }

    /// Reject a timeline the given policy cannot schedule against
    pub fn validate_for(&self, policy: &SyncPolicy) -> std::result::Result<(), PlanningError> {
        if self.beats.is_empty() && policy.cut_on_beats && !policy.allow_beat_skipping {
            return Err(PlanningError::NoBeatsAvailable);
        }
        Ok(())
    }

    /// Parse the beat-detection collaborator's JSON payload
    pub fn from_json(json: &str, duration: f64) -> Result<Self> {
        let payload: BeatsPayload = serde_json::from_str(json).map_err(|e| PlanningError::InvalidTimeline {
            details: format!("malformed beats payload: {}", e),
        })?;

        let duration = payload.duration.unwrap_or(duration);
        let signature = payload.metadata.time_signature.as_deref().unwrap_or("4/4");

        Ok(Self::new(payload.beats, payload.metadata.bpm, signature, duration)?)
    }

    /// Load a beats payload from disk
    pub fn from_file<P: AsRef<Path>>(path: P, duration: f64) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;
        Self::from_json(&content, duration)
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// Indexed beats whose time falls in `[start, end]`
    pub fn beats_in_range(&self, start: f64, end: f64) -> impl Iterator<Item = (usize, &Beat)> {
        let first = self.beats.partition_point(|b| b.time < start);
        self.beats[first..]
            .iter()
            .enumerate()
            .map(move |(offset, beat)| (first + offset, beat))
            .take_while(move |(_, beat)| beat.time <= end)
    }

    /// Closest beat within `max_distance` of `time`, optionally of one type
    ///
    /// Ties go to the earlier beat.
    pub fn find_nearest_beat(&self, time: f64, max_distance: f64, beat_type: Option<BeatType>) -> Option<(usize, &Beat)> {
        if !(time.is_finite() && max_distance >= 0.0) {
            return None;
        }

        self.beats_in_range(time - max_distance, time + max_distance)
            .filter(|(_, beat)| beat_type.map_or(true, |t| beat.beat_type == t))
            .min_by(|(_, a), (_, b)| (a.time - time).abs().total_cmp(&(b.time - time).abs()))
    }

    /// Snap clip boundaries onto nearby beats
    ///
    /// Starts prefer a downbeat when `prefer_downbeats` is set and fall back
    /// to any beat. A span that snapping would empty or invert is returned
    /// unchanged.
    pub fn synchronize_clips_to_beats(&self, clips: &[ClipSpan], options: &SnapOptions) -> Vec<ClipSpan> {
        let snap = |time: f64, beat_type: Option<BeatType>| {
            self.find_nearest_beat(time, options.threshold, beat_type).map(|(_, beat)| beat.time)
        };

        clips
            .iter()
            .map(|clip| {
                let start = options
                    .prefer_downbeats
                    .then(|| snap(clip.start, Some(BeatType::Downbeat)))
                    .flatten()
                    .or_else(|| snap(clip.start, None))
                    .unwrap_or(clip.start);
                let end = snap(clip.end, None).unwrap_or(clip.end);

                if end - start < TIME_EPSILON {
                    debug!("Keeping clip '{}' unsnapped, beats would collapse it", clip.id);
                    return clip.clone();
                }
                ClipSpan { id: clip.id.clone(), start, end }
            })
            .collect()
    }

    /// Seconds per bar at the timeline's tempo
    pub fn bar_duration(&self) -> f64 {
        60.0 / self.bpm * self.time_signature.beats_per_measure as f64
    }
}

/// A clip placed on the timeline, `[start, end)` in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpan {
    pub id: String,
    pub start: f64,
    pub end: f64,
}

impl ClipSpan {
    pub fn new<S: Into<String>>(id: S, start: f64, end: f64) -> Self {
        Self { id: id.into(), start, end }
    }
}

/// How far and onto what clip boundaries may snap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapOptions {
    /// Largest move allowed, in seconds
    pub threshold: f64,
    pub prefer_downbeats: bool,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            prefer_downbeats: true,
        }
    }
}

/// Wire shape of a beats payload
#[derive(Debug, Deserialize)]
struct BeatsPayload {
    beats: Vec<Beat>,
    metadata: BeatsMetadata,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BeatsMetadata {
    bpm: f64,
    #[serde(default)]
    time_signature: Option<String>,
}
