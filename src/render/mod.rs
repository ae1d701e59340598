//! Render planning and execution
//!
//! [`RenderCommandBuilder`] lowers segments and transitions into a
//! [`RenderJob`]: a flat, ordered list of media operations that serializes
//! deterministically. A [`RenderExecutor`] performs the job; [`RenderRunner`]
//! wraps any executor with timeouts, bounded retries, cancellation and
//! per-destination exclusivity.

pub mod executor;
pub mod ffmpeg;
pub mod job;
pub mod runner;

#[cfg(test)]
pub(crate) mod mock;

pub use executor::{JobHandle, JobStatus, RenderArtifact, RenderExecutor};
pub use ffmpeg::FfmpegExecutor;
pub use job::{AudioMix, OutputSpec, QualityTier, RenderCommandBuilder, RenderJob, RenderOperation, RenderSummary};
pub use runner::{cancellation, CancelToken, CancelTrigger, RenderOutcome, RenderRunner};
