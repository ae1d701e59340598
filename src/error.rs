use std::fmt;

use thiserror::Error;

/// Main error type for the beatcut library
#[derive(Error, Debug)]
pub enum BeatcutError {
    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Timeline,
    Scheduler,
    Segmenter,
    TransitionPlanner,
    CommandBuilder,
    Executor,
    Config,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Timeline => "timeline",
            Stage::Scheduler => "scheduler",
            Stage::Segmenter => "segmenter",
            Stage::TransitionPlanner => "transition-planner",
            Stage::CommandBuilder => "command-builder",
            Stage::Executor => "executor",
            Stage::Config => "config",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while turning a timeline into segments. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    #[error("Invalid sync policy: {reason}")]
    InvalidPolicy { reason: String },

    #[error("No beats available and the policy requires cutting on beats")]
    NoBeatsAvailable,

    #[error("Insufficient source clips: {reason}")]
    InsufficientSourceClips { reason: String },

    #[error("Invalid beat timeline: {details}")]
    InvalidTimeline { details: String },
}

impl PlanningError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidPolicy { .. } => Stage::Scheduler,
            Self::NoBeatsAvailable | Self::InvalidTimeline { .. } => Stage::Timeline,
            Self::InsufficientSourceClips { .. } => Stage::Segmenter,
        }
    }
}

/// Errors raised while lowering segments into a render job
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Unsupported transition type: {name}")]
    UnsupportedTransition { name: String },

    #[error("Invalid output spec: {details}")]
    InvalidOutputSpec { details: String },

    #[error("Transitions do not match segments: {details}")]
    MismatchedTransitions { details: String },

    #[error("Segment {segment} references unknown clip '{clip_id}'")]
    UnknownSourceClip { segment: usize, clip_id: String },

    #[error("Clip '{clip_id}' has {available:.3}s between its in- and out-point but segment {segment} needs {needed:.3}s")]
    ClipTooShort { segment: usize, clip_id: String, available: f64, needed: f64 },
}

/// Errors surfaced by (or around) the render executor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Render timed out after {seconds:.1}s")]
    Timeout { seconds: f64 },

    #[error("Executor unreachable: {reason}")]
    Transport { reason: String },

    #[error("Executor reported failure: {diagnostic}")]
    Failed { diagnostic: String },

    #[error("Codec failure: {diagnostic}")]
    Codec { diagnostic: String },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Render cancelled before the executor accepted the job")]
    CancelledBeforeStart,

    #[error("Executor never accepted the job: {0}")]
    Rejected(Box<ExecutionError>),

    #[error("Another render is already writing to {destination}")]
    DestinationBusy { destination: String },

    #[error("Unknown render job: {id}")]
    UnknownJob { id: String },
}

impl ExecutionError {
    /// Network and timeout failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }

    /// Whether the executor may have written anything to the destination
    pub fn rendering_started(&self) -> bool {
        !matches!(
            self,
            Self::CancelledBeforeStart | Self::Rejected(_) | Self::DestinationBusy { .. }
        )
    }

    /// Restate an error for a job no executor ever acknowledged
    pub fn before_start(self) -> Self {
        match self {
            Self::Cancelled => Self::CancelledBeforeStart,
            e if !e.rendering_started() => e,
            e => Self::Rejected(Box::new(e)),
        }
    }
}

/// Configuration-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to write configuration file {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

/// Convenience type alias for Results using BeatcutError
pub type Result<T> = std::result::Result<T, BeatcutError>;

impl BeatcutError {
    /// The pipeline stage this error came from
    pub fn stage(&self) -> Stage {
        match self {
            Self::Planning(e) => e.stage(),
            Self::Build(_) => Stage::CommandBuilder,
            Self::Execution(_) => Stage::Executor,
            Self::Config(_) | Self::Io(_) => Stage::Config,
        }
    }

    /// Whether the executor may have produced partial output
    ///
    /// Planning, build and config errors all surface before anything is
    /// submitted, so there is nothing to clean up.
    pub fn rendering_started(&self) -> bool {
        match self {
            Self::Execution(e) => e.rendering_started(),
            _ => false,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Execution(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Planning(PlanningError::NoBeatsAvailable) => {
                "The beat timeline is empty. Enable beat skipping or disable cut-on-beats to render without beats.".to_string()
            }
            Self::Planning(PlanningError::InsufficientSourceClips { .. }) => {
                "No usable source clips were supplied. Add at least one clip with a positive weight.".to_string()
            }
            Self::Build(BuildError::UnsupportedTransition { name }) => {
                format!("Transition '{}' is not supported. Available transitions: cut, crossfade, fade, slide, zoom", name)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => format!("[{}] {}", self.stage(), self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_errors_report_their_stage() {
        let err: BeatcutError = PlanningError::InvalidPolicy { reason: "min > max".into() }.into();
        assert_eq!(err.stage(), Stage::Scheduler);
        assert!(!err.rendering_started());

        let err: BeatcutError = PlanningError::NoBeatsAvailable.into();
        assert_eq!(err.stage(), Stage::Timeline);

        let err: BeatcutError = PlanningError::InsufficientSourceClips { reason: "empty".into() }.into();
        assert_eq!(err.stage(), Stage::Segmenter);
    }

    #[test]
    fn test_execution_errors_mark_rendering_started() {
        let err: BeatcutError = ExecutionError::Codec { diagnostic: "bad frame".into() }.into();
        assert_eq!(err.stage(), Stage::Executor);
        assert!(err.rendering_started());
        assert!(!err.is_recoverable());

        let busy: BeatcutError = ExecutionError::DestinationBusy { destination: "out.mp4".into() }.into();
        assert!(!busy.rendering_started());
    }

    #[test]
    fn test_unacknowledged_jobs_never_started() {
        assert_eq!(ExecutionError::Cancelled.before_start(), ExecutionError::CancelledBeforeStart);

        let rejected = ExecutionError::Failed { diagnostic: "queue full".into() }.before_start();
        assert_eq!(
            rejected,
            ExecutionError::Rejected(Box::new(ExecutionError::Failed { diagnostic: "queue full".into() }))
        );
        assert!(rejected.to_string().contains("queue full"));

        let busy = ExecutionError::DestinationBusy { destination: "out.mp4".into() };
        assert_eq!(busy.clone().before_start(), busy);

        for err in [ExecutionError::CancelledBeforeStart, rejected] {
            let err: BeatcutError = err.into();
            assert_eq!(err.stage(), Stage::Executor);
            assert!(!err.rendering_started());
        }
    }

    #[test]
    fn test_io_errors_belong_to_config() {
        let err: BeatcutError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into();
        assert_eq!(err.stage(), Stage::Config);
        assert!(!err.rendering_started());
    }

    #[test]
    fn test_only_transient_failures_are_recoverable() {
        assert!(ExecutionError::Timeout { seconds: 3.0 }.is_transient());
        assert!(ExecutionError::Transport { reason: "reset".into() }.is_transient());
        assert!(!ExecutionError::Failed { diagnostic: "x".into() }.is_transient());
        assert!(!ExecutionError::Cancelled.is_transient());

        let err: BeatcutError = BuildError::InvalidOutputSpec { details: "fps".into() }.into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_user_message_names_supported_transitions() {
        let err: BeatcutError = BuildError::UnsupportedTransition { name: "wipe".into() }.into();
        assert!(err.user_message().contains("crossfade"));
    }
}
