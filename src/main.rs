use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use beatcut::{
    composition::{CompositionEngine, ExportRequest, SelectionStrategy, SourceClip},
    config::Config,
    render::{cancellation, FfmpegExecutor, RenderRunner},
    sync::{CutStyle, TransitionType},
    timeline::BeatTimeline,
};

#[derive(Parser)]
#[command(
    name = "beatcut",
    version,
    about = "Cut music videos on the beat",
    long_about = "beatcut schedules cuts on detected beats, assigns source clips to every segment, plans transitions and renders the result with ffmpeg."
)]
struct Cli {
    /// Beats JSON from the beat detector
    #[arg(short, long)]
    timeline: PathBuf,

    /// JSON array of source clips
    #[arg(long)]
    clips: PathBuf,

    /// Soundtrack path or URL
    #[arg(short, long)]
    audio: String,

    /// Output video file path
    #[arg(short, long)]
    output: PathBuf,

    /// Track length in seconds, when the beats file does not carry one
    #[arg(short, long)]
    duration: Option<f64>,

    /// Cut style preset (balanced, music_video, cinematic, ...)
    #[arg(short, long)]
    style: Option<CutStyle>,

    /// Transition between clips (cut, crossfade, fade, slide, zoom)
    #[arg(long)]
    transition: Option<TransitionType>,

    /// Seed for weighted clip selection
    #[arg(long)]
    seed: Option<u64>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the render job as JSON instead of rendering
    #[arg(long)]
    plan_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str())))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting beatcut v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let engine = CompositionEngine::new(config.clone());

    let timeline = BeatTimeline::from_file(&cli.timeline, cli.duration.unwrap_or(0.0))
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    let clips = load_clips(&cli.clips)?;
    let request = ExportRequest::new(timeline, clips, cli.audio.clone(), &config);

    if cli.plan_only {
        let planned = engine.plan(&request).map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("{}", planned.job.to_json()?);
        return Ok(());
    }

    let executor = FfmpegExecutor::new(&config.render.ffmpeg_path);
    let version = executor
        .check_available()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    info!("Using {}", version);

    let runner = RenderRunner::new(Arc::new(executor), config.render.clone())
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let (trigger, token) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling render...");
            trigger.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f32>();
    let reporter = tokio::spawn(async move {
        while let Some(pct) = progress_rx.recv().await {
            eprint!("\rRendering... {:5.1}%", pct);
        }
        eprintln!();
    });

    let result = engine
        .render(&request, &runner, &cli.output, token, Some(progress_tx))
        .await;
    let _ = reporter.await;

    match result {
        Ok(outcome) => {
            info!(
                "Render complete! {} segments, {} transitions, {:.1}s -> {:?} ({} bytes)",
                outcome.summary.segment_count,
                outcome.summary.transition_count,
                outcome.summary.duration_seconds,
                outcome.artifact.location,
                outcome.artifact.byte_len
            );
            Ok(())
        }
        Err(e) => {
            if e.rendering_started() && cli.output.exists() {
                warn!("Removing partial output {:?}", cli.output);
                let _ = std::fs::remove_file(&cli.output);
            }
            Err(anyhow::anyhow!(e.user_message()))
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    if let Some(style) = cli.style {
        config.sync = config.sync.with_style(style);
    }
    if let Some(transition) = cli.transition {
        config.sync = config.sync.with_transition(transition);
    }
    if let Some(seed) = cli.seed {
        config.selection = SelectionStrategy::Weighted { seed };
    }

    config.validate()?;
    Ok(config)
}

fn load_clips(path: &Path) -> Result<Vec<SourceClip>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read clips file {:?}", path))?;
    let clips: Vec<SourceClip> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse clips file {:?}", path))?;
    Ok(clips)
}
