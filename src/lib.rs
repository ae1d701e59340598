//! # beatcut
//!
//! Cut music videos on the beat.
//!
//! This library turns a beat timeline and a pool of source clips into a
//! deterministic render job: cuts land on downbeats and strong beats within
//! the configured clip-length bounds, every segment is mapped to a source
//! clip, and each join gets a transition sized to its neighbours.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use beatcut::{
//!     composition::{CompositionEngine, ExportRequest, SourceClip},
//!     config::Config,
//!     sync::{CutStyle, SyncPolicy},
//!     timeline::BeatTimeline,
//! };
//!
//! # fn main() -> beatcut::Result<()> {
//! let mut config = Config::default();
//! config.sync = SyncPolicy::for_style(CutStyle::MusicVideo);
//!
//! let timeline = BeatTimeline::from_file("beats.json", 180.0)?;
//! let clips = vec![
//!     SourceClip::new("intro", "clips/intro.mp4"),
//!     SourceClip::new("chorus", "clips/chorus.mp4"),
//! ];
//!
//! let engine = CompositionEngine::new(config.clone());
//! let planned = engine.plan(&ExportRequest::new(timeline, clips, "song.mp3", &config))?;
//!
//! println!("{}", planned.job.to_json().unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`timeline`] - Validated beat timelines
//! - [`sync`] - Sync policy and the cut scheduler
//! - [`composition`] - Clip segmentation, transitions and the pipeline engine
//! - [`render`] - Render jobs, executors and the render runner
//! - [`config`] - Configuration management
//!
//! ## Rendering
//!
//! Any backend can render a job by implementing
//! [`RenderExecutor`](render::RenderExecutor). The bundled
//! [`FfmpegExecutor`](render::FfmpegExecutor) shells out to a local ffmpeg;
//! [`RenderRunner`](render::RenderRunner) adds timeouts, retries and
//! cancellation around any executor.

pub mod composition;
pub mod config;
pub mod error;
pub mod render;
pub mod sync;
pub mod timeline;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{CompositionEngine, ExportRequest, PlannedRender},
    config::Config,
    error::{BeatcutError, Result},
    render::{RenderExecutor, RenderJob, RenderRunner},
    sync::{CutScheduler, SyncPolicy},
    timeline::BeatTimeline,
};
