use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::render::job::RenderJob;

/// Opaque reference to a job accepted by an executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    id: Uuid,
    destination: PathBuf,
    submitted_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn new(destination: &Path) -> Self {
        Self {
            id: Uuid::new_v4(),
            destination: destination.to_path_buf(),
            submitted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// Finished output written by an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderArtifact {
    pub location: PathBuf,
    pub byte_len: u64,
}

/// Executor-side state of a submitted job
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Queued,

    /// Percentage in `[0, 100]` as reported by the executor
    Running { progress: f32 },

    Completed(RenderArtifact),

    Failed(ExecutionError),

    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed(_) | JobStatus::Failed(_) | JobStatus::Cancelled)
    }
}

/// Backend that turns a [`RenderJob`] into an encoded file
///
/// Implementations own the actual media work; retries, timeouts and
/// destination locking live in [`crate::render::RenderRunner`].
#[async_trait]
pub trait RenderExecutor: Send + Sync {
    /// Accept a job for rendering into `destination`
    async fn submit(&self, job: Arc<RenderJob>, destination: &Path) -> Result<JobHandle, ExecutionError>;

    /// Current state of a previously submitted job
    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus, ExecutionError>;

    /// Request cancellation; a job that already finished is left alone
    async fn cancel(&self, handle: &JobHandle) -> Result<(), ExecutionError>;

    fn name(&self) -> &str {
        "executor"
    }
}
