use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    composition::segmenter::{ClipSegmenter, Segment, SelectionStrategy, SourceClip},
    composition::transitions::{TransitionPlanner, TransitionSpec},
    config::Config,
    error::Result,
    render::{CancelToken, OutputSpec, RenderCommandBuilder, RenderJob, RenderOutcome, RenderRunner, RenderSummary},
    sync::{CutPlan, CutScheduler, SyncPolicy},
    timeline::BeatTimeline,
};

/// Everything one export needs besides the engine's own settings
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub timeline: BeatTimeline,
    pub clips: Vec<SourceClip>,
    pub audio_track: String,
    pub policy: SyncPolicy,
    pub output: OutputSpec,
    pub selection: SelectionStrategy,
}

impl ExportRequest {
    /// Request using the policy, output and selection from `config`
    pub fn new<S: Into<String>>(timeline: BeatTimeline, clips: Vec<SourceClip>, audio_track: S, config: &Config) -> Self {
        Self {
            timeline,
            clips,
            audio_track: audio_track.into(),
            policy: config.sync.clone(),
            output: config.output.clone(),
            selection: config.selection,
        }
    }
}

/// Output of the planning stages, ready for an executor
#[derive(Debug, Clone)]
pub struct PlannedRender {
    pub cut_plan: CutPlan,
    pub segments: Vec<Segment>,
    pub transitions: Vec<TransitionSpec>,
    pub job: Arc<RenderJob>,
    pub summary: RenderSummary,
}

/// Main composition engine that drives an export from beats to rendered file
///
/// The engine follows a fixed pipeline:
/// 1. Timeline check - Reject timelines the policy cannot schedule against
/// 2. Cut scheduling - Place cuts on beats within the clip-length bounds
/// 3. Segmentation - Assign a source clip to every segment
/// 4. Transition planning - Size a transition for every join
/// 5. Job building - Lower everything into render operations
/// 6. Rendering - Hand the job to an executor (optional)
///
/// Planning stages are pure and never touch an executor, so a failure there
/// leaves no partial output behind.
pub struct CompositionEngine {
    config: Config,
}

impl CompositionEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every planning stage for one request
    pub fn plan(&self, request: &ExportRequest) -> Result<PlannedRender> {
        info!("🎬 Planning export");
        info!("   Duration: {:.2}s, {} beats @ {:.1} BPM",
              request.timeline.duration(), request.timeline.beats().len(), request.timeline.bpm());
        info!("   Clips: {}", request.clips.len());
        if let Some(style) = request.policy.cut_style {
            info!("   Style: {}", style);
        }

        // Pipeline Step 1: Timeline check
        self.check_timeline(request)?;

        // Pipeline Step 2: Cut scheduling
        let cut_plan = self.schedule_cuts(request)?;

        // Pipeline Step 3: Segmentation
        let segments = self.assign_clips(request, &cut_plan)?;

        // Pipeline Step 4: Transition planning
        let transitions = self.plan_transitions(request, &segments);

        // Pipeline Step 5: Job building
        let job = self.build_job(request, &segments, &transitions)?;
        let summary = job.summary();

        info!("🎉 Plan ready: {} segments, {} transitions, {:.2}s of video",
              summary.segment_count, summary.transition_count, job.output_duration());

        Ok(PlannedRender {
            cut_plan,
            segments,
            transitions,
            job: Arc::new(job),
            summary,
        })
    }

    /// Plan independent requests in parallel, preserving input order
    pub fn plan_batch(&self, requests: &[ExportRequest]) -> Vec<Result<PlannedRender>> {
        info!("📦 Planning {} exports", requests.len());
        requests.par_iter().map(|request| self.plan(request)).collect()
    }

    /// Plan a request and render it through `runner`
    pub async fn render(
        &self,
        request: &ExportRequest,
        runner: &RenderRunner,
        destination: &Path,
        cancel: CancelToken,
        progress: Option<mpsc::UnboundedSender<f32>>,
    ) -> Result<RenderOutcome> {
        let planned = self.plan(request)?;

        // Pipeline Step 6: Rendering
        info!("🎞️  Step 6: Rendering to {:?}", destination);
        let outcome = runner
            .run(Arc::clone(&planned.job), destination, cancel, progress)
            .await
            .map_err(|e| {
                warn!("Rendering failed: {}", e);
                e
            })?;

        info!("   ✅ Wrote {} bytes in {} attempt(s)", outcome.artifact.byte_len, outcome.attempts);
        Ok(outcome)
    }

    // ==========================================
    // PIPELINE STEP 1: TIMELINE CHECK
    // ==========================================

    fn check_timeline(&self, request: &ExportRequest) -> Result<()> {
        debug!("🥁 Step 1: Checking beat timeline...");
        request.policy.validate()?;
        request.timeline.validate_for(&request.policy)?;
        Ok(())
    }

    // ==========================================
    // PIPELINE STEP 2: CUT SCHEDULING
    // ==========================================

    fn schedule_cuts(&self, request: &ExportRequest) -> Result<CutPlan> {
        info!("⏱️  Step 2: Scheduling cuts...");

        let scheduler = CutScheduler::new(request.policy.clone());
        let plan = scheduler.schedule(&request.timeline)?;

        info!("   ✅ {} cuts, {} on beats", plan.segment_count().saturating_sub(1), plan.beat_aligned_count());
        Ok(plan)
    }

    // ==========================================
    // PIPELINE STEP 3: SEGMENTATION
    // ==========================================

    fn assign_clips(&self, request: &ExportRequest, plan: &CutPlan) -> Result<Vec<Segment>> {
        info!("📹 Step 3: Assigning clips to segments...");

        let segmenter = ClipSegmenter::new(&request.clips)?;
        let mut selector = request.selection.selector(&request.clips)?;
        let segments = segmenter.segment(plan, selector.as_mut())?;

        debug!("   {} segments using {:?} selection", segments.len(), request.selection);
        Ok(segments)
    }

    // ==========================================
    // PIPELINE STEP 4: TRANSITION PLANNING
    // ==========================================

    fn plan_transitions(&self, request: &ExportRequest, segments: &[Segment]) -> Vec<TransitionSpec> {
        info!("✨ Step 4: Planning {} transitions...", request.policy.transition_type);
        TransitionPlanner::from_policy(&request.policy).plan(segments)
    }

    // ==========================================
    // PIPELINE STEP 5: JOB BUILDING
    // ==========================================

    fn build_job(
        &self,
        request: &ExportRequest,
        segments: &[Segment],
        transitions: &[TransitionSpec],
    ) -> Result<RenderJob> {
        info!("🔧 Step 5: Building render job...");

        let audio = self.config.audio.mix_for(request.audio_track.as_str());
        let job = RenderCommandBuilder::new(request.output.clone())
            .build(segments, transitions, &request.clips, &audio)?;
        Ok(job)
    }
}
