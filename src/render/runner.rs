use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::RenderConfig;
use crate::error::{ExecutionError, Result as BeatcutResult};
use crate::render::executor::{JobHandle, JobStatus, RenderArtifact, RenderExecutor};
use crate::render::job::{RenderJob, RenderSummary};

/// Create a linked cancel trigger and token
pub fn cancellation() -> (CancelTrigger, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelTrigger { tx }, CancelToken { rx: Some(rx) })
}

/// Caller side of a cancellation pair
#[derive(Debug)]
pub struct CancelTrigger {
    tx: watch::Sender<bool>,
}

impl CancelTrigger {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the runner; cloned freely
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token nobody can trigger
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };

        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Trigger dropped without firing
                return std::future::pending().await;
            }
        }
    }
}

/// Result of a successful render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    pub artifact: RenderArtifact,
    pub summary: RenderSummary,
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
}

/// Drives a [`RenderExecutor`] with timeouts, retries and cancellation
///
/// At most one render may target a given destination at a time.
pub struct RenderRunner {
    executor: Arc<dyn RenderExecutor>,
    config: RenderConfig,
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Releases a destination claim when dropped
struct DestinationClaim {
    active: Arc<Mutex<HashSet<PathBuf>>>,
    destination: PathBuf,
}

impl Drop for DestinationClaim {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.destination);
    }
}

impl RenderRunner {
    /// Fails with a config error when `config` does not validate
    pub fn new(executor: Arc<dyn RenderExecutor>, config: RenderConfig) -> BeatcutResult<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            config,
            active: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `job` into `destination`
    ///
    /// Transient failures (timeouts, transport errors) are retried up to
    /// `max_retries` times with exponential backoff. Executor diagnostics are
    /// passed through untouched. Progress percentages are forwarded as the
    /// executor reports them.
    ///
    /// When no attempt was ever acknowledged by the executor, the error is
    /// `CancelledBeforeStart` or `Rejected`, so callers know nothing was written.
    pub async fn run(
        &self,
        job: Arc<RenderJob>,
        destination: &Path,
        mut cancel: CancelToken,
        progress: Option<mpsc::UnboundedSender<f32>>,
    ) -> Result<RenderOutcome, ExecutionError> {
        let _claim = self.claim(destination)?;
        let summary = job.summary();
        let mut attempts = 0u32;
        let mut acknowledged = false;

        info!("🎬 Rendering {} with {} executor", destination.display(), self.executor.name());

        let settle = |e: ExecutionError, acknowledged: bool| if acknowledged { e } else { e.before_start() };

        loop {
            if cancel.is_cancelled() {
                return Err(settle(ExecutionError::Cancelled, acknowledged));
            }

            attempts += 1;
            debug!("Render attempt {} for {}", attempts, destination.display());

            match self.attempt(&job, destination, &mut cancel, progress.as_ref(), &mut acknowledged).await {
                Ok(artifact) => {
                    info!("✅ Render finished after {} attempt(s): {}", attempts, artifact.location.display());
                    return Ok(RenderOutcome {
                        artifact,
                        summary,
                        attempts,
                        finished_at: Utc::now(),
                    });
                }
                Err(e) if e.is_transient() && attempts <= self.config.max_retries => {
                    let backoff = self.config.backoff_for(attempts - 1);
                    warn!("Render attempt {} failed ({}), retrying in {:?}", attempts, e, backoff);

                    tokio::select! {
                        _ = sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(settle(ExecutionError::Cancelled, acknowledged)),
                    }
                }
                Err(e) => {
                    warn!("❌ Render failed after {} attempt(s): {}", attempts, e);
                    return Err(settle(e, acknowledged));
                }
            }
        }
    }

    fn claim(&self, destination: &Path) -> Result<DestinationClaim, ExecutionError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(destination.to_path_buf()) {
            return Err(ExecutionError::DestinationBusy {
                destination: destination.display().to_string(),
            });
        }

        Ok(DestinationClaim {
            active: Arc::clone(&self.active),
            destination: destination.to_path_buf(),
        })
    }

    async fn attempt(
        &self,
        job: &Arc<RenderJob>,
        destination: &Path,
        cancel: &mut CancelToken,
        progress: Option<&mpsc::UnboundedSender<f32>>,
        acknowledged: &mut bool,
    ) -> Result<RenderArtifact, ExecutionError> {
        let limit = self.config.timeout();
        let deadline = Instant::now() + limit;
        let timed_out = || ExecutionError::Timeout { seconds: limit.as_secs_f64() };

        // Dropping the submit future aborts before the executor acknowledges the job
        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
            submitted = timeout_at(deadline, self.executor.submit(Arc::clone(job), destination)) => {
                submitted.map_err(|_| timed_out())??
            }
        };
        *acknowledged = true;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
            watched = timeout_at(deadline, self.watch(&handle, progress)) => {
                watched.unwrap_or_else(|_| Err(timed_out()))
            }
        };

        if matches!(result, Err(ExecutionError::Cancelled) | Err(ExecutionError::Timeout { .. })) {
            if let Err(e) = self.executor.cancel(&handle).await {
                warn!("Failed to cancel job {}: {}", handle.id(), e);
            }
        }

        result
    }

    async fn watch(
        &self,
        handle: &JobHandle,
        progress: Option<&mpsc::UnboundedSender<f32>>,
    ) -> Result<RenderArtifact, ExecutionError> {
        loop {
            match self.executor.poll(handle).await? {
                JobStatus::Queued => {}
                JobStatus::Running { progress: pct } => {
                    if let Some(tx) = progress {
                        // Receiver gone just means nobody is listening
                        let _ = tx.send(pct);
                    }
                }
                JobStatus::Completed(artifact) => return Ok(artifact),
                JobStatus::Failed(error) => return Err(error),
                JobStatus::Cancelled => return Err(ExecutionError::Cancelled),
            }

            sleep(self.config.poll_interval()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::job::OutputSpec;
    use crate::render::mock::{artifact, Script, ScriptedExecutor};
    use std::time::Duration;

    fn fast_config() -> RenderConfig {
        RenderConfig {
            timeout_secs: 1.0,
            max_retries: 2,
            backoff_base_ms: 5,
            poll_interval_ms: 1,
            ..RenderConfig::default()
        }
    }

    fn job() -> Arc<RenderJob> {
        Arc::new(RenderJob::from_json(&format!(
            r#"{{"operations": [], "output": {}}}"#,
            serde_json::to_string(&OutputSpec::default()).unwrap()
        )).unwrap())
    }

    #[tokio::test]
    async fn test_success_forwards_progress_unmodified() {
        let executor = ScriptedExecutor::new(vec![Script::succeed(&[12.5, 50.0, 99.9])]);
        let runner = RenderRunner::new(executor.clone(), fast_config()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = runner
            .run(job(), Path::new("out.mp4"), CancelToken::never(), Some(tx))
            .await
            .unwrap();

        assert_eq!(outcome.artifact, artifact());
        assert_eq!(outcome.attempts, 1);

        let mut seen = Vec::new();
        while let Ok(pct) = rx.try_recv() {
            seen.push(pct);
        }
        assert_eq!(seen, vec![12.5, 50.0, 99.9]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let executor = ScriptedExecutor::new(vec![
            Script::fail(ExecutionError::Transport { reason: "connection reset".into() }),
            Script::Reject(ExecutionError::Transport { reason: "refused".into() }),
            Script::succeed(&[100.0]),
        ]);
        let runner = RenderRunner::new(executor.clone(), fast_config()).unwrap();

        let outcome = runner
            .run(job(), Path::new("out.mp4"), CancelToken::never(), None)
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(executor.submits(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let transport = || Script::fail(ExecutionError::Transport { reason: "reset".into() });
        let executor = ScriptedExecutor::new(vec![transport(), transport(), transport(), Script::succeed(&[])]);
        let runner = RenderRunner::new(executor.clone(), fast_config()).unwrap();

        let result = runner.run(job(), Path::new("out.mp4"), CancelToken::never(), None).await;

        assert!(matches!(result, Err(ExecutionError::Transport { .. })));
        assert_eq!(executor.submits(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_keeps_diagnostic() {
        let diagnostic = "Error while decoding stream #0:0: Invalid data found".to_string();
        let executor = ScriptedExecutor::new(vec![Script::fail(ExecutionError::Codec {
            diagnostic: diagnostic.clone(),
        })]);
        let runner = RenderRunner::new(executor.clone(), fast_config()).unwrap();

        let result = runner.run(job(), Path::new("out.mp4"), CancelToken::never(), None).await;

        assert_eq!(result, Err(ExecutionError::Codec { diagnostic }));
        assert_eq!(executor.submits(), 1);
    }

    #[tokio::test]
    async fn test_hung_job_times_out_and_is_cancelled() {
        let executor = ScriptedExecutor::new(vec![Script::Hang]);
        let config = RenderConfig {
            timeout_secs: 0.05,
            max_retries: 0,
            ..fast_config()
        };
        let runner = RenderRunner::new(executor.clone(), config).unwrap();

        let result = runner.run(job(), Path::new("out.mp4"), CancelToken::never(), None).await;

        assert!(matches!(result, Err(ExecutionError::Timeout { .. })));
        assert_eq!(executor.cancels(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start_never_submits() {
        let executor = ScriptedExecutor::new(vec![]);
        let runner = RenderRunner::new(executor.clone(), fast_config()).unwrap();
        let (trigger, token) = cancellation();
        trigger.cancel();

        let result = runner.run(job(), Path::new("out.mp4"), token, None).await;

        assert_eq!(result, Err(ExecutionError::CancelledBeforeStart));
        assert!(!result.unwrap_err().rendering_started());
        assert_eq!(executor.submits(), 0);
    }

    #[tokio::test]
    async fn test_rejected_submit_never_started() {
        let queue_full = ExecutionError::Failed { diagnostic: "queue full".into() };
        let executor = ScriptedExecutor::new(vec![Script::Reject(queue_full.clone())]);
        let runner = RenderRunner::new(executor.clone(), fast_config()).unwrap();

        let err = runner
            .run(job(), Path::new("out.mp4"), CancelToken::never(), None)
            .await
            .unwrap_err();

        assert_eq!(err, ExecutionError::Rejected(Box::new(queue_full)));
        assert!(!err.rendering_started());
        assert_eq!(executor.submits(), 1);
        assert_eq!(executor.cancels(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_transport_rejections_never_started() {
        let refused = || Script::Reject(ExecutionError::Transport { reason: "refused".into() });
        let executor = ScriptedExecutor::new(vec![refused(), refused(), refused()]);
        let runner = RenderRunner::new(executor.clone(), fast_config()).unwrap();

        let err = runner
            .run(job(), Path::new("out.mp4"), CancelToken::never(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Rejected(ref cause) if cause.is_transient()));
        assert!(!err.rendering_started());
        assert_eq!(executor.submits(), 3);
    }

    #[tokio::test]
    async fn test_cancel_after_acknowledged_attempt_counts_as_started() {
        let executor = ScriptedExecutor::new(vec![
            Script::fail(ExecutionError::Transport { reason: "reset".into() }),
            Script::succeed(&[]),
        ]);
        let config = RenderConfig { backoff_base_ms: 5_000, ..fast_config() };
        let runner = RenderRunner::new(executor.clone(), config).unwrap();
        let (trigger, token) = cancellation();

        let run = runner.run(job(), Path::new("out.mp4"), token, None);
        let cancel_during_backoff = async {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        };
        let (result, ()) = tokio::join!(run, cancel_during_backoff);

        assert_eq!(result, Err(ExecutionError::Cancelled));
        assert!(result.unwrap_err().rendering_started());
        assert_eq!(executor.submits(), 1);
    }

    #[test]
    fn test_invalid_config_is_refused() {
        for timeout_secs in [-1.0, f64::NAN, f64::INFINITY, 0.0] {
            let config = RenderConfig { timeout_secs, ..fast_config() };
            let result = RenderRunner::new(ScriptedExecutor::new(vec![]), config);
            assert!(matches!(
                result,
                Err(crate::error::BeatcutError::Config(crate::error::ConfigError::InvalidValue { .. }))
            ));
        }
    }

    #[tokio::test]
    async fn test_destination_is_exclusive() {
        let executor = ScriptedExecutor::new(vec![Script::Hang]);
        let runner = RenderRunner::new(executor.clone(), fast_config()).unwrap();
        let (trigger, token) = cancellation();
        let destination = Path::new("shared.mp4");

        let first = runner.run(job(), destination, token, None);
        let second = async {
            sleep(Duration::from_millis(20)).await;
            let result = runner.run(job(), destination, CancelToken::never(), None).await;
            trigger.cancel();
            result
        };

        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, Err(ExecutionError::Cancelled));
        assert!(matches!(second, Err(ExecutionError::DestinationBusy { .. })));
        assert_eq!(executor.cancels(), 1);

        // Claim is released once the first run returns
        let again = runner.run(job(), destination, CancelToken::never(), None).await;
        assert!(again.is_ok());
    }
}
