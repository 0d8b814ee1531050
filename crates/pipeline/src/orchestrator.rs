//! Drives one video job through every stage.
//!
//! Stages run strictly in sequence. Within a stage, per-scene work is
//! issued concurrently and joined before the next stage starts; scene
//! `order` is carried through every stage and decides the final
//! concatenation order.
//!
//! Any stage error is caught exactly once in [`VideoPipeline::process_video`],
//! which rolls back uploaded artifacts, records the failure on the project,
//! publishes a failure event and returns the error to the caller. The job's
//! scratch directory is removed on every exit path. Nothing is retried.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::json;
use storyreel_core::capabilities::{GenerationProvider, ObjectStorage, ProjectStore, SpeechProvider};
use storyreel_core::generation::{GenerationJob, GenerationKind, GenerationRequest};
use storyreel_core::naming::{
    final_video_key, music_key, scene_asset_key, thumbnail_key, SCENE_VIDEO_ASSET,
};
use storyreel_core::poll::PollPolicy;
use storyreel_core::progress::PipelineStage;
use storyreel_core::project::{
    validate_for_generation, JobRecordStatus, ProjectSettings, ProjectStatus, Scene, VideoInfo,
};
use storyreel_core::types::{DbId, JobId};
use storyreel_events::{EventBus, PipelineEvent, PipelineEventKind};
use storyreel_providers::ProviderRegistry;

use crate::assembly::Transition;
use crate::clock::Clock;
use crate::compositor::SubtitleStyle;
use crate::error::PipelineError;
use crate::media::MediaEngine;
use crate::narration::{NarrationPadding, NarrationSynthesizer, SceneNarration};
use crate::poller::{GenerationPoller, JobSpec};
use crate::progress::ProgressReporter;
use crate::workspace::JobWorkspace;

/// Voice used when a project does not name one.
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

/// Music volume relative to narration.
pub const DEFAULT_MUSIC_VOLUME: f64 = 0.3;

/// Queue payload: which project to render, for whom, under which job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoJobRequest {
    pub job_id: JobId,
    pub project_id: DbId,
    pub user_id: DbId,
}

/// Injected collaborators of a pipeline run.
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: Arc<dyn ProjectStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub registry: ProviderRegistry,
    pub speech: Arc<dyn SpeechProvider>,
    pub media: Arc<dyn MediaEngine>,
    pub events: Arc<EventBus>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent of the per-job scratch directories.
    pub work_dir: PathBuf,
    pub poll: PollPolicy,
    /// Model for background music. Music is skipped when unset.
    pub music_model: Option<String>,
    pub default_voice_id: String,
    pub padding: NarrationPadding,
    pub subtitle_style: SubtitleStyle,
    pub transition: Transition,
    pub music_volume: f64,
    /// Preferred thumbnail position, capped at half the video length.
    pub thumbnail_at: f64,
}

impl PipelineConfig {
    /// Narration padding wide enough that the scene transition never
    /// overlaps speech.
    pub fn narration_padding(&self) -> NarrationPadding {
        self.padding.covering(self.transition.duration)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            poll: PollPolicy::default(),
            music_model: None,
            default_voice_id: DEFAULT_VOICE_ID.to_string(),
            padding: NarrationPadding::default(),
            subtitle_style: SubtitleStyle::default(),
            transition: Transition::default(),
            music_volume: DEFAULT_MUSIC_VOLUME,
            thumbnail_at: 1.0,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOutcome {
    pub video_url: String,
    pub thumbnail_url: String,
    /// Sum of the padded narration durations, in seconds.
    pub duration: f64,
}

/// Inputs of one scene's composition, matched by scene order.
struct SceneInputs<'a> {
    scene: &'a Scene,
    video: &'a GenerationJob,
    narration: &'a SceneNarration,
}

/// Everything a run needs, checked before any external call.
struct RunPlan {
    settings: ProjectSettings,
    scenes: Vec<Scene>,
    video_provider: Arc<dyn GenerationProvider>,
    music: Option<(String, String, Arc<dyn GenerationProvider>)>,
    voice_id: String,
}

pub struct VideoPipeline {
    deps: PipelineDeps,
    config: PipelineConfig,
}

impl VideoPipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        Self { deps, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Render the project named by `request` into a final video.
    pub async fn process_video(&self, request: &VideoJobRequest) -> Result<VideoOutcome, PipelineError> {
        tracing::info!(
            job_id = %request.job_id,
            project_id = request.project_id,
            user_id = request.user_id,
            "Video pipeline started",
        );

        let reporter = ProgressReporter::new(
            Arc::clone(&self.deps.store),
            Arc::clone(&self.deps.events),
            Arc::clone(&self.deps.clock),
            request.job_id,
            request.project_id,
            request.user_id,
        );
        let mut uploaded: Vec<String> = Vec::new();

        match self.run(request, &reporter, &mut uploaded).await {
            Ok(outcome) => {
                tracing::info!(
                    job_id = %request.job_id,
                    project_id = request.project_id,
                    duration = outcome.duration,
                    "Video pipeline completed",
                );
                Ok(outcome)
            }
            Err(err) => {
                self.record_failure(request, &reporter, &uploaded, &err).await;
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn run(
        &self,
        request: &VideoJobRequest,
        reporter: &ProgressReporter,
        uploaded: &mut Vec<String>,
    ) -> Result<VideoOutcome, PipelineError> {
        let plan = self.plan(request).await?;

        let now = self.deps.clock.now();
        let job_id = request.job_id;
        reporter
            .modify(|project| {
                project.transition_to(ProjectStatus::Generating, now)?;
                project.record_job(job_id, JobRecordStatus::Processing, 0, None, now);
                Ok(())
            })
            .await?;

        let workspace = JobWorkspace::create(&self.config.work_dir, request.job_id)?;

        let video_jobs = self.generate_videos(request, &plan, reporter).await?;
        let music_key = self.generate_music(request, &plan, reporter).await?;
        let narrations = self.synthesize_narration(&plan, &workspace, reporter).await?;
        let clips = self
            .compose_scenes(&plan, &video_jobs, &narrations, &workspace, reporter)
            .await?;
        let final_path = self
            .assemble(&clips, music_key.as_deref(), &workspace, reporter)
            .await?;
        let outcome = self
            .finalize(request, &plan, &narrations, &final_path, &workspace, reporter, uploaded)
            .await?;

        if let Err(e) = workspace.close() {
            tracing::warn!(job_id = %request.job_id, error = %e, "Failed to remove job workspace");
        }
        Ok(outcome)
    }

    /// Load and validate the project and resolve every provider it needs.
    async fn plan(&self, request: &VideoJobRequest) -> Result<RunPlan, PipelineError> {
        let project = self.deps.store.load_project(request.project_id).await?;
        let (breakdown, settings) = validate_for_generation(&project)?;

        let video_provider = self.deps.registry.get(&settings.video_model)?;
        let music = match (breakdown.music_brief(), &self.config.music_model) {
            (Some(brief), Some(model)) => {
                let provider = self.deps.registry.get(model)?;
                Some((model.clone(), brief.to_string(), provider))
            }
            (Some(_), None) => {
                tracing::warn!(
                    project_id = request.project_id,
                    "Music requested but no music model configured, skipping",
                );
                None
            }
            (None, _) => None,
        };

        let voice_id = settings
            .voice_id
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.config.default_voice_id.as_str())
            .to_string();

        Ok(RunPlan {
            settings: settings.clone(),
            scenes: breakdown.ordered_scenes(),
            video_provider,
            music,
            voice_id,
        })
    }

    fn poller(&self, provider: Arc<dyn GenerationProvider>) -> GenerationPoller {
        GenerationPoller::new(
            provider,
            Arc::clone(&self.deps.storage),
            Arc::clone(&self.deps.clock),
            self.config.poll,
        )
    }

    async fn generate_videos(
        &self,
        request: &VideoJobRequest,
        plan: &RunPlan,
        reporter: &ProgressReporter,
    ) -> Result<BTreeMap<i32, GenerationJob>, PipelineError> {
        let specs: Vec<JobSpec> = plan
            .scenes
            .iter()
            .map(|scene| video_job_spec(request, &plan.settings, scene))
            .collect();

        let poller = self.poller(Arc::clone(&plan.video_provider));
        let mut jobs = poller.submit_all(&specs).await?;
        tracing::info!(job_id = %request.job_id, scenes = jobs.len(), "Scene videos submitted");

        poller
            .poll_batch(&mut jobs, &reporter.sink(PipelineStage::VideoGeneration))
            .await?;
        Ok(jobs
            .into_iter()
            .filter_map(|job| job.scene_order.map(|order| (order, job)))
            .collect())
    }

    /// Returns the storage key of the generated music, if any.
    async fn generate_music(
        &self,
        request: &VideoJobRequest,
        plan: &RunPlan,
        reporter: &ProgressReporter,
    ) -> Result<Option<String>, PipelineError> {
        let Some((model, brief, provider)) = &plan.music else {
            reporter.stage(PipelineStage::MusicGeneration, 1.0).await?;
            return Ok(None);
        };

        let spec = JobSpec {
            model_id: model.clone(),
            kind: GenerationKind::Music,
            request: GenerationRequest {
                prompt: brief.clone(),
                reference_assets: Vec::new(),
                config: json!({}),
            },
            storage_key: music_key(request.user_id, request.project_id),
            label: "music".to_string(),
            scene_order: None,
        };

        let poller = self.poller(Arc::clone(provider));
        let job = poller.submit(&spec).await?;
        let mut jobs = [job];
        poller
            .poll_batch(&mut jobs, &reporter.sink(PipelineStage::MusicGeneration))
            .await?;
        Ok(Some(spec.storage_key))
    }

    async fn synthesize_narration(
        &self,
        plan: &RunPlan,
        workspace: &JobWorkspace,
        reporter: &ProgressReporter,
    ) -> Result<Vec<SceneNarration>, PipelineError> {
        let synthesizer = NarrationSynthesizer::new(
            Arc::clone(&self.deps.speech),
            Arc::clone(&self.deps.media),
            self.config.narration_padding(),
        );
        let total = plan.scenes.len();
        let done = AtomicUsize::new(0);
        let (synthesizer, done, dir, voice_id) = (&synthesizer, &done, workspace.path(), plan.voice_id.as_str());

        let narrations = try_join_all(plan.scenes.iter().map(|scene| async move {
            let narration = synthesizer
                .synthesize(scene.order, &scene.voice_over, voice_id, dir)
                .await?;
            let completed = done.fetch_add(1, Ordering::SeqCst) + 1;
            reporter
                .stage(PipelineStage::Narration, completed as f64 / total as f64)
                .await?;
            Ok::<_, PipelineError>(narration)
        }))
        .await?;

        reporter
            .modify(|project| {
                if let Some(breakdown) = project.breakdown.as_mut() {
                    for narration in &narrations {
                        if let Some(scene) = breakdown.scene_mut(narration.order) {
                            scene.duration = Some(narration.duration);
                        }
                    }
                }
                Ok(())
            })
            .await?;

        Ok(narrations)
    }

    /// Download, reconcile and subtitle every scene. Returns the composed
    /// clips sorted by scene order.
    async fn compose_scenes(
        &self,
        plan: &RunPlan,
        video_jobs: &BTreeMap<i32, GenerationJob>,
        narrations: &[SceneNarration],
        workspace: &JobWorkspace,
        reporter: &ProgressReporter,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let inputs = match_scene_inputs(&plan.scenes, video_jobs, narrations)?;
        let total = inputs.len();
        let done = AtomicUsize::new(0);
        let aspect = plan.settings.aspect_ratio;
        let style = &self.config.subtitle_style;
        let (storage, media) = (&self.deps.storage, &self.deps.media);
        let (done, dir) = (&done, workspace.path());

        let tasks = inputs
            .into_iter()
            .map(|SceneInputs { scene, video, narration }| async move {
                let order = scene.order;
                let source = dir.join(format!("scene-{order}-source.mp4"));
                storage.download_file(&video.storage_key, &source).await?;

                let with_audio = dir.join(format!("scene-{order}-audio.mp4"));
                let reconciliation = media
                    .add_audio_to_video(&source, &narration.audio_path, &with_audio, aspect)
                    .await?;
                tracing::debug!(
                    scene_order = order,
                    stretch_factor = reconciliation.stretch_factor,
                    output_duration = reconciliation.output_duration,
                    "Scene reconciled",
                );

                let composed = dir.join(format!("scene-{order}-final.mp4"));
                media
                    .add_subtitles_to_video(&with_audio, &narration.words, style, &composed)
                    .await?;

                let completed = done.fetch_add(1, Ordering::SeqCst) + 1;
                reporter
                    .stage(PipelineStage::Composition, completed as f64 / total as f64)
                    .await?;
                Ok::<_, PipelineError>((order, composed))
            });

        let mut clips = try_join_all(tasks).await?;
        clips.sort_by_key(|(order, _)| *order);
        Ok(clips.into_iter().map(|(_, path)| path).collect())
    }

    async fn assemble(
        &self,
        clips: &[PathBuf],
        music_key: Option<&str>,
        workspace: &JobWorkspace,
        reporter: &ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        let dir = workspace.path();
        let combined = dir.join("combined.mp4");
        let combined_duration = self
            .deps
            .media
            .combine_videos(clips, &self.config.transition, &combined)
            .await?;
        tracing::debug!(clips = clips.len(), combined_duration, "Scenes combined");
        reporter.stage(PipelineStage::Assembly, 0.5).await?;

        let output = match music_key {
            Some(key) => {
                let music = dir.join("music.mp3");
                self.deps.storage.download_file(key, &music).await?;
                let mixed = dir.join("final.mp4");
                self.deps
                    .media
                    .add_music_to_video(&combined, &music, &mixed, self.config.music_volume)
                    .await?;
                mixed
            }
            None => combined,
        };
        reporter.stage(PipelineStage::Assembly, 1.0).await?;
        Ok(output)
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        request: &VideoJobRequest,
        plan: &RunPlan,
        narrations: &[SceneNarration],
        final_path: &Path,
        workspace: &JobWorkspace,
        reporter: &ProgressReporter,
        uploaded: &mut Vec<String>,
    ) -> Result<VideoOutcome, PipelineError> {
        let duration: f64 = narrations.iter().map(|n| n.duration).sum();

        let thumbnail = workspace.path().join("thumbnail.jpg");
        self.deps
            .media
            .generate_thumbnail(
                final_path,
                self.config.thumbnail_at.min(duration / 2.0),
                plan.settings.aspect_ratio,
                &thumbnail,
            )
            .await?;
        reporter.stage(PipelineStage::Finalize, 0.25).await?;

        let video_key = final_video_key(request.user_id, request.project_id, request.job_id);
        uploaded.push(video_key.clone());
        let video_url = self
            .deps
            .storage
            .upload_buffer(tokio::fs::read(final_path).await?, &video_key, "video/mp4")
            .await?;

        let thumb_key = thumbnail_key(request.user_id, request.project_id, request.job_id);
        uploaded.push(thumb_key.clone());
        let thumbnail_url = self
            .deps
            .storage
            .upload_buffer(tokio::fs::read(&thumbnail).await?, &thumb_key, "image/jpeg")
            .await?;
        reporter.stage(PipelineStage::Finalize, 0.75).await?;

        let now = self.deps.clock.now();
        let job_id = request.job_id;
        let info = VideoInfo {
            url: video_url.clone(),
            storage_key: video_key,
            duration,
            thumbnail_url: thumbnail_url.clone(),
        };
        reporter
            .modify(move |project| {
                project.transition_to(ProjectStatus::Completed, now)?;
                project.video = Some(info);
                project.record_job(job_id, JobRecordStatus::Completed, 100, None, now);
                Ok(())
            })
            .await?;

        self.deps.events.publish(PipelineEvent::new(
            request.job_id,
            request.project_id,
            request.user_id,
            PipelineEventKind::Completed {
                video_url: video_url.clone(),
                thumbnail_url: thumbnail_url.clone(),
                duration_secs: duration,
            },
        ));

        Ok(VideoOutcome {
            video_url,
            thumbnail_url,
            duration,
        })
    }

    // -----------------------------------------------------------------------
    // Failure
    // -----------------------------------------------------------------------

    /// Roll back uploads, mark the project failed and publish the failure.
    /// Problems here are logged; the original error is what the caller sees.
    async fn record_failure(
        &self,
        request: &VideoJobRequest,
        reporter: &ProgressReporter,
        uploaded: &[String],
        err: &PipelineError,
    ) {
        tracing::error!(
            job_id = %request.job_id,
            project_id = request.project_id,
            error_kind = err.kind(),
            error = %err,
            "Video pipeline failed",
        );

        for key in uploaded {
            if let Err(e) = self.deps.storage.delete_file(key).await {
                tracing::warn!(key = %key, error = %e, "Failed to delete uploaded artifact");
            }
        }

        let message = err.to_string();
        let now = self.deps.clock.now();
        let job_id = request.job_id;
        let recorded = message.clone();
        let result = reporter
            .modify(move |project| {
                if let Err(e) = project.transition_to(ProjectStatus::Failed, now) {
                    tracing::warn!(error = %e, "Project status left unchanged");
                }
                project.record_job(job_id, JobRecordStatus::Failed, 0, Some(recorded), now);
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::error!(
                job_id = %request.job_id,
                project_id = request.project_id,
                error = %e,
                "Failed to record pipeline failure",
            );
        }

        self.deps.events.publish(PipelineEvent::new(
            request.job_id,
            request.project_id,
            request.user_id,
            PipelineEventKind::Failed {
                error_kind: err.kind().to_string(),
                message,
            },
        ));
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Scene description followed by the project style.
pub fn compose_prompt(description: &str, style: &str) -> String {
    let description = description.trim();
    let style = style.trim();
    match (description.is_empty(), style.is_empty()) {
        (_, true) => description.to_string(),
        (true, false) => format!("Style: {style}"),
        (false, false) => format!("{description}\n\nStyle: {style}"),
    }
}

/// Scene image first, then every character reference image.
pub fn reference_assets(scene: &Scene, settings: &ProjectSettings) -> Vec<String> {
    std::iter::once(scene.image_url.clone())
        .chain(
            settings
                .characters
                .iter()
                .filter_map(|c| c.image_url.as_deref())
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
        )
        .collect()
}

fn video_job_spec(request: &VideoJobRequest, settings: &ProjectSettings, scene: &Scene) -> JobSpec {
    JobSpec {
        model_id: settings.video_model.clone(),
        kind: GenerationKind::Video,
        request: GenerationRequest {
            prompt: compose_prompt(&scene.image_description, &settings.style),
            reference_assets: reference_assets(scene, settings),
            config: json!({ "aspect_ratio": settings.aspect_ratio.as_str() }),
        },
        storage_key: scene_asset_key(
            request.user_id,
            request.project_id,
            scene.order,
            SCENE_VIDEO_ASSET,
        ),
        label: format!("scene {}", scene.order),
        scene_order: Some(scene.order),
    }
}

/// Pair every scene with its generated clip and narration by scene order.
fn match_scene_inputs<'a>(
    scenes: &'a [Scene],
    video_jobs: &'a BTreeMap<i32, GenerationJob>,
    narrations: &'a [SceneNarration],
) -> Result<Vec<SceneInputs<'a>>, PipelineError> {
    let narrations: BTreeMap<i32, &SceneNarration> =
        narrations.iter().map(|n| (n.order, n)).collect();

    scenes
        .iter()
        .map(|scene| {
            let video = video_jobs.get(&scene.order).ok_or_else(|| {
                PipelineError::Internal(format!("No generated video for scene {}", scene.order))
            })?;
            let narration = narrations.get(&scene.order).copied().ok_or_else(|| {
                PipelineError::Internal(format!("No narration for scene {}", scene.order))
            })?;
            Ok(SceneInputs {
                scene,
                video,
                narration,
            })
        })
        .collect()
}
