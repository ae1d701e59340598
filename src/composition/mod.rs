//! # Composition
//!
//! Maps a cut plan onto source footage and drives the planning pipeline.
//!
//! - [`segmenter`] assigns a source clip to every span between cuts
//! - [`transitions`] sizes the visual treatment at each join
//! - [`engine`] runs every stage in order and hands the result to a renderer

pub mod engine;
pub mod segmenter;
pub mod transitions;

// Re-exports for convenience
pub use engine::{CompositionEngine, ExportRequest, PlannedRender};
pub use segmenter::{
    ClipSegmenter, ClipSelector, RoundRobinSelector, Segment, SelectionStrategy, SourceClip, TrimHint,
    WeightedSelector,
};
pub use transitions::{TransitionPlanner, TransitionSpec};
