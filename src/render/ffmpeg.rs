use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::render::executor::{JobHandle, JobStatus, RenderArtifact, RenderExecutor};
use crate::render::job::{RenderJob, RenderOperation};
use crate::sync::TransitionType;

type JobTable = Arc<Mutex<HashMap<Uuid, TrackedJob>>>;

struct TrackedJob {
    status: JobStatus,
    kill: Option<oneshot::Sender<()>>,
}

/// Renders jobs by spawning a local ffmpeg process per job
pub struct FfmpegExecutor {
    ffmpeg_path: PathBuf,
    jobs: JobTable,
}

impl FfmpegExecutor {
    pub fn new<P: Into<PathBuf>>(ffmpeg_path: P) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check that the configured binary runs; returns its version banner
    pub async fn check_available(&self) -> Result<String, ExecutionError> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| ExecutionError::Failed {
                diagnostic: format!("FFmpeg not found at {}: {}", self.ffmpeg_path.display(), e),
            })?;

        if !output.status.success() {
            return Err(ExecutionError::Failed {
                diagnostic: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let banner = String::from_utf8_lossy(&output.stdout);
        Ok(banner.lines().next().unwrap_or_default().to_string())
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TrackedJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Jobs still tracked (running, or finished but not yet polled)
    pub fn tracked_jobs(&self) -> usize {
        self.table().len()
    }
}

#[async_trait]
impl RenderExecutor for FfmpegExecutor {
    async fn submit(&self, job: Arc<RenderJob>, destination: &Path) -> Result<JobHandle, ExecutionError> {
        let args = command_args(&job, destination);
        debug!("ffmpeg {}", args.join(" "));

        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::Failed {
                diagnostic: format!("Failed to start {}: {}", self.ffmpeg_path.display(), e),
            })?;

        let handle = JobHandle::new(destination);
        let (kill_tx, kill_rx) = oneshot::channel();
        self.table().insert(
            handle.id(),
            TrackedJob {
                status: JobStatus::Running { progress: 0.0 },
                kill: Some(kill_tx),
            },
        );

        let jobs = Arc::clone(&self.jobs);
        let id = handle.id();
        let expected = job.output_duration();
        let destination = destination.to_path_buf();

        tokio::spawn(async move {
            let status = supervise(child, kill_rx, expected, &jobs, id, &destination).await;
            let mut table = jobs.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = table.get_mut(&id) {
                entry.status = status;
                entry.kill = None;
            }
        });

        info!("🚀 Started ffmpeg job {}", id);
        Ok(handle)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<JobStatus, ExecutionError> {
        let mut table = self.table();
        let status = table
            .get(&handle.id())
            .map(|entry| entry.status.clone())
            .ok_or_else(|| ExecutionError::UnknownJob { id: handle.id().to_string() })?;

        if status.is_terminal() {
            table.remove(&handle.id());
        }
        Ok(status)
    }

    /// Kill the job and forget it; later polls report `UnknownJob`
    async fn cancel(&self, handle: &JobHandle) -> Result<(), ExecutionError> {
        let entry = self
            .table()
            .remove(&handle.id())
            .ok_or_else(|| ExecutionError::UnknownJob { id: handle.id().to_string() })?;

        if let Some(kill) = entry.kill {
            let _ = kill.send(());
            info!("🛑 Cancelling ffmpeg job {}", handle.id());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

async fn supervise(
    mut child: Child,
    mut kill: oneshot::Receiver<()>,
    expected: f64,
    jobs: &JobTable,
    id: Uuid,
    destination: &Path,
) -> JobStatus {
    let stderr = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut text = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut text).await;
            text
        })
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = &mut kill => {
                    let _ = child.kill().await;
                    return JobStatus::Cancelled;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(progress) = parse_progress(&line, expected) {
                            let mut table = jobs.lock().unwrap_or_else(|e| e.into_inner());
                            if let Some(entry) = table.get_mut(&id) {
                                entry.status = JobStatus::Running { progress };
                            }
                        }
                    }
                    _ => break,
                }
            }
        }
    }

    let exit = tokio::select! {
        _ = &mut kill => {
            let _ = child.kill().await;
            return JobStatus::Cancelled;
        }
        exit = child.wait() => exit,
    };

    let stderr = match stderr {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    match exit {
        Ok(status) if status.success() => match tokio::fs::metadata(destination).await {
            Ok(meta) => JobStatus::Completed(RenderArtifact {
                location: destination.to_path_buf(),
                byte_len: meta.len(),
            }),
            Err(e) => JobStatus::Failed(ExecutionError::Failed {
                diagnostic: format!("ffmpeg exited cleanly but {} is unreadable: {}", destination.display(), e),
            }),
        },
        Ok(status) => {
            warn!("ffmpeg job {} exited with {}", id, status);
            JobStatus::Failed(classify_failure(stderr))
        }
        Err(e) => JobStatus::Failed(ExecutionError::Transport { reason: e.to_string() }),
    }
}

/// Map ffmpeg's stderr onto an error kind, keeping the text as-is
fn classify_failure(stderr: String) -> ExecutionError {
    const NETWORK: [&str; 5] = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "network is unreachable",
        "server returned 5",
    ];
    const CODEC: [&str; 4] = ["invalid data found", "error while decoding", "unknown encoder", "codec not currently supported"];

    let lower = stderr.to_ascii_lowercase();
    if NETWORK.iter().any(|p| lower.contains(p)) {
        ExecutionError::Transport { reason: stderr }
    } else if CODEC.iter().any(|p| lower.contains(p)) {
        ExecutionError::Codec { diagnostic: stderr }
    } else {
        ExecutionError::Failed { diagnostic: stderr }
    }
}

/// Turn one `-progress` line into a percentage of `expected` seconds
fn parse_progress(line: &str, expected: f64) -> Option<f32> {
    let (key, value) = line.split_once('=')?;
    match key.trim() {
        // Both keys carry microseconds
        "out_time_us" | "out_time_ms" if expected > 0.0 => {
            let micros: f64 = value.trim().parse().ok()?;
            Some((micros / 1_000_000.0 / expected * 100.0).clamp(0.0, 100.0) as f32)
        }
        "progress" if value.trim() == "end" => Some(100.0),
        _ => None,
    }
}

fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

fn xfade_name(transition: TransitionType) -> &'static str {
    match transition {
        TransitionType::Cut | TransitionType::Crossfade => "fade",
        TransitionType::Fade => "fadeblack",
        TransitionType::Slide => "slideleft",
        TransitionType::Zoom => "zoomin",
    }
}

/// (video codec, audio codec, muxer) for a container
fn codecs_for(format: &str) -> (&'static str, &'static str, &'static str) {
    match format {
        "webm" => ("libvpx-vp9", "libopus", "webm"),
        "mov" => ("libx264", "aac", "mov"),
        "mkv" => ("libx264", "aac", "matroska"),
        _ => ("libx264", "aac", "mp4"),
    }
}

/// Build the `filter_complex` graph for a job
///
/// Every segment is normalized to the output frame rate and pixel format,
/// then joined left to right. xfade offsets are absolute output times taken
/// from [`RenderJob::join_starts`].
pub fn filter_graph(job: &RenderJob) -> String {
    let output = job.output();
    let trims: Vec<(usize, &str, f64, f64)> = job.trims().collect();

    let mut chains = Vec::with_capacity(trims.len() * 2 + 2);

    for (input, (segment, _, _, _)) in trims.iter().enumerate() {
        let mut filters = Vec::with_capacity(4);
        if let Some((width, height)) = job.scale_for(*segment) {
            filters.push(format!("scale={}:{}", width, height));
        }
        filters.push("setsar=1".to_string());
        filters.push(format!("fps={}", output.fps));
        filters.push("format=yuv420p".to_string());
        chains.push(format!("[{}:v]{}[v{}]", input, filters.join(","), segment));
    }

    let mut current = "v0".to_string();

    let joins = job
        .operations()
        .iter()
        .filter(|op| matches!(op, RenderOperation::Concat { .. } | RenderOperation::Transition { .. }));

    for (k, (op, start)) in joins.zip(job.join_starts()).enumerate() {
        let label = format!("j{}", k);
        match op {
            RenderOperation::Concat { to, .. } => {
                chains.push(format!("[{}][v{}]concat=n=2:v=1:a=0[{}]", current, to, label));
            }
            RenderOperation::Transition { to, transition_type, duration, .. } => {
                chains.push(format!(
                    "[{}][v{}]xfade=transition={}:duration={}:offset={}[{}]",
                    current,
                    to,
                    xfade_name(*transition_type),
                    secs(*duration),
                    secs(start),
                    label
                ));
            }
            _ => continue,
        }
        current = label;
    }
    chains.push(format!("[{}]null[vout]", current));

    if let Some(RenderOperation::AudioMix { fade_in, fade_out, normalize, volume, .. }) = job.audio_mix() {
        let length = job.output_duration();
        let mut filters = vec![
            format!("atrim=end={}", secs(length)),
            "asetpts=PTS-STARTPTS".to_string(),
            format!("volume={}", volume),
        ];
        if *fade_in > 0.0 {
            filters.push(format!("afade=t=in:st=0:d={}", secs(*fade_in)));
        }
        if *fade_out > 0.0 {
            filters.push(format!(
                "afade=t=out:st={}:d={}",
                secs((length - fade_out).max(0.0)),
                secs(*fade_out)
            ));
        }
        if *normalize {
            filters.push("loudnorm".to_string());
        }
        chains.push(format!("[{}:a]{}[aout]", trims.len(), filters.join(",")));
    }

    chains.join(";")
}

/// Full ffmpeg argument list for rendering `job` into `destination`
pub fn command_args(job: &RenderJob, destination: &Path) -> Vec<String> {
    let output = job.output();
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-nostats", "-progress", "pipe:1"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    for (_, source, start, end) in job.trims() {
        args.extend([
            "-ss".to_string(),
            secs(start),
            "-t".to_string(),
            secs(end - start),
            "-i".to_string(),
            source.to_string(),
        ]);
    }

    let audio_url = match job.audio_mix() {
        Some(RenderOperation::AudioMix { track_url, .. }) => Some(track_url.clone()),
        _ => None,
    };
    if let Some(url) = &audio_url {
        args.extend(["-i".to_string(), url.clone()]);
    }

    args.extend(["-filter_complex".to_string(), filter_graph(job)]);
    args.extend(["-map".to_string(), "[vout]".to_string()]);
    if audio_url.is_some() {
        args.extend(["-map".to_string(), "[aout]".to_string()]);
    }

    let (video_codec, audio_codec, muxer) = codecs_for(&output.format);
    args.extend([
        "-c:v".to_string(),
        video_codec.to_string(),
        "-b:v".to_string(),
        format!("{}k", output.quality_tier.video_bitrate_kbps()),
        "-r".to_string(),
        output.fps.to_string(),
    ]);
    if audio_url.is_some() {
        args.extend([
            "-c:a".to_string(),
            audio_codec.to_string(),
            "-b:a".to_string(),
            format!("{}k", output.quality_tier.audio_bitrate_kbps()),
        ]);
    }
    if muxer == "mp4" || muxer == "mov" {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }
    args.extend(["-f".to_string(), muxer.to_string(), destination.display().to_string()]);

    args
}
