//! # Beat Timeline
//!
//! Validated, time-ordered beats as delivered by a beat-detection
//! collaborator. Everything downstream assumes the invariants enforced here:
//! strictly increasing beat times, every beat inside `[0, duration]`, and
//! intensity/energy within `[0, 1]`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use beatcut::timeline::{Beat, BeatTimeline, BeatType};
//!
//! # fn main() -> beatcut::Result<()> {
//! let timeline = BeatTimeline::new(
//!     vec![
//!         Beat::new(2.0, BeatType::Regular, 0.4, 0.5),
//!         Beat::new(1.0, BeatType::Downbeat, 0.9, 0.8),
//!     ],
//!     120.0,
//!     "4/4",
//!     12.0,
//! )?;
//!
//! assert_eq!(timeline.beats()[0].time, 1.0);
//! # Ok(())
//! # }
//! ```

pub mod types;

pub use types::{Beat, BeatRef, BeatTimeline, BeatType, ClipSpan, SnapOptions, TimeSignature};
