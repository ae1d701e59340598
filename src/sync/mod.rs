//! # Beat Synchronization
//!
//! Turns a [`BeatTimeline`](crate::timeline::BeatTimeline) and an immutable
//! [`SyncPolicy`] into a [`CutPlan`]: the ordered timestamps where the video
//! switches between segments.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use beatcut::sync::{CutScheduler, CutStyle, SyncPolicy};
//! use beatcut::timeline::BeatTimeline;
//!
//! # fn main() -> beatcut::Result<()> {
//! let timeline = BeatTimeline::from_file("beats.json", 180.0)?;
//! let scheduler = CutScheduler::new(SyncPolicy::for_style(CutStyle::Balanced));
//! let plan = scheduler.schedule(&timeline)?;
//!
//! println!("{} segments", plan.segment_count());
//! # Ok(())
//! # }
//! ```

pub mod policy;
pub mod scheduler;

pub use policy::{CutStyle, SyncPolicy, TransitionType, HARD_MAX_CLIP_DURATION};
pub use scheduler::{CutPlan, CutPoint, CutReason, CutScheduler};
