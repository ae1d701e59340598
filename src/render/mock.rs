//! Scripted executor for exercising the runner and engine without ffmpeg

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::render::executor::{JobHandle, JobStatus, RenderArtifact, RenderExecutor};
use crate::render::job::RenderJob;

/// What the executor does with the next submitted job
pub(crate) enum Script {
    Reject(ExecutionError),
    Run {
        progress: Vec<f32>,
        outcome: Result<RenderArtifact, ExecutionError>,
    },
    /// Stays running until cancelled
    Hang,
}

impl Script {
    pub(crate) fn succeed(progress: &[f32]) -> Self {
        Script::Run { progress: progress.to_vec(), outcome: Ok(artifact()) }
    }

    pub(crate) fn fail(error: ExecutionError) -> Self {
        Script::Run { progress: vec![10.0], outcome: Err(error) }
    }
}

pub(crate) fn artifact() -> RenderArtifact {
    RenderArtifact { location: "out.mp4".into(), byte_len: 4096 }
}

#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    scripts: Mutex<VecDeque<Script>>,
    jobs: Mutex<HashMap<Uuid, VecDeque<JobStatus>>>,
    submits: AtomicUsize,
    cancels: AtomicUsize,
}

impl ScriptedExecutor {
    pub(crate) fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self { scripts: Mutex::new(scripts.into()), ..Self::default() })
    }

    pub(crate) fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub(crate) fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderExecutor for ScriptedExecutor {
    async fn submit(&self, _job: Arc<RenderJob>, destination: &Path) -> Result<JobHandle, ExecutionError> {
        self.submits.fetch_add(1, Ordering::SeqCst);

        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::succeed(&[100.0]));
        let statuses: VecDeque<JobStatus> = match script {
            Script::Reject(error) => return Err(error),
            Script::Run { progress, outcome } => std::iter::once(JobStatus::Queued)
                .chain(progress.into_iter().map(|progress| JobStatus::Running { progress }))
                .chain(std::iter::once(match outcome {
                    Ok(artifact) => JobStatus::Completed(artifact),
                    Err(error) => JobStatus::Failed(error),
                }))
                .collect(),
            Script::Hang => VecDeque::from(vec![JobStatus::Queued, JobStatus::Running { progress: 0.0 }]),
        };

        let handle = JobHandle::new(destination);
        self.jobs.lock().unwrap().insert(handle.id(), statuses);
        Ok(handle)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus, ExecutionError> {
        let mut jobs = self.jobs.lock().unwrap();
        let statuses = jobs
            .get_mut(&handle.id())
            .ok_or_else(|| ExecutionError::UnknownJob { id: handle.id().to_string() })?;

        // The last status sticks
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or(JobStatus::Queued))
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), ExecutionError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if let Some(statuses) = self.jobs.lock().unwrap().get_mut(&handle.id()) {
            *statuses = VecDeque::from(vec![JobStatus::Cancelled]);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
