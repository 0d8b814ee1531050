//! In-memory fakes of every pipeline collaborator.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use storyreel_core::capabilities::{
    GenerationProvider, ObjectStorage, ProjectStore, ProviderError, SpeechProvider,
    SpeechSynthesis, StorageError, StoreError,
};
use storyreel_core::ffmpeg::FfmpegError;
use storyreel_core::generation::{GenerationRequest, ProviderJobState};
use storyreel_core::poll::PollPolicy;
use storyreel_core::project::{Breakdown, Project, ProjectSettings, ProjectStatus, Scene};
use storyreel_core::reconcile::Reconciliation;
use storyreel_core::resolution::AspectRatio;
use storyreel_core::subtitles::{CharacterAlignment, WordTimestamp};
use storyreel_core::types::DbId;
use storyreel_events::EventBus;
use storyreel_pipeline::assembly::{combined_duration, clamp_transition, Transition};
use storyreel_pipeline::clock::ManualClock;
use storyreel_pipeline::compositor::SubtitleStyle;
use storyreel_pipeline::narration::NarrationPadding;
use storyreel_pipeline::{
    MediaEngine, PipelineConfig, PipelineDeps, VideoJobRequest, VideoPipeline,
};
use storyreel_providers::ProviderRegistry;

pub const VIDEO_MODEL: &str = "kling-v2";
pub const MUSIC_MODEL: &str = "stable-audio";
pub const USER_ID: DbId = 4;
pub const PROJECT_ID: DbId = 9;

/// Length of every generated scene clip.
pub const CLIP_SECONDS: f64 = 5.0;

// ---------------------------------------------------------------------------
// Project store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    projects: Mutex<HashMap<DbId, Project>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with(project: Project) -> Self {
        let store = Self::default();
        store.projects.lock().unwrap().insert(project.id, project);
        store
    }

    pub fn get(&self, id: DbId) -> Project {
        self.projects.lock().unwrap()[&id].clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn load_project(&self, project_id: DbId) -> Result<Project, StoreError> {
        self.projects
            .lock()
            .unwrap()
            .get(&project_id)
            .cloned()
            .ok_or(StoreError::NotFound(project_id))
    }

    async fn save_project(&self, project: &Project) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.projects
            .lock()
            .unwrap()
            .insert(project.id, project.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub deleted: Mutex<Vec<String>>,
    /// Uploads to keys containing this fragment fail.
    pub fail_uploads_containing: Option<String>,
}

impl MemoryStorage {
    pub fn failing_uploads(fragment: &str) -> Self {
        Self {
            fail_uploads_containing: Some(fragment.to_string()),
            ..Self::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload_buffer(&self, bytes: Vec<u8>, key: &str, _content_type: &str) -> Result<String, StorageError> {
        if let Some(fragment) = &self.fail_uploads_containing {
            if key.contains(fragment.as_str()) {
                return Err(StorageError::Upload {
                    key: key.to_string(),
                    reason: "bucket unavailable".to_string(),
                });
            }
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(format!("https://cdn.test/{key}"))
    }

    async fn download_file(&self, key: &str, local_path: &Path) -> Result<(), StorageError> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::Download {
                key: key.to_string(),
                reason: "no such key".to_string(),
            })?;
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Generation provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Every request reports in-progress `n` times, then completes.
    CompleteAfter(u32),
    /// Requests never finish.
    NeverComplete,
    /// The request with this submission index fails; others complete.
    FailRequest(usize, String),
}

pub struct FakeGeneration {
    behavior: Behavior,
    pub submitted: Mutex<Vec<GenerationRequest>>,
    checks: Mutex<HashMap<String, u32>>,
}

impl FakeGeneration {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            submitted: Mutex::new(Vec::new()),
            checks: Mutex::new(HashMap::new()),
        }
    }

    pub fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationProvider for FakeGeneration {
    async fn submit(&self, _model_id: &str, request: &GenerationRequest) -> Result<String, ProviderError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(request.clone());
        Ok(format!("req-{}", submitted.len() - 1))
    }

    async fn check_status(&self, _model_id: &str, request_id: &str) -> Result<ProviderJobState, ProviderError> {
        let mut checks = self.checks.lock().unwrap();
        let count = checks.entry(request_id.to_string()).or_insert(0);
        *count += 1;
        let done = ProviderJobState::Completed {
            result_url: format!("https://gen.test/{request_id}.bin"),
        };

        Ok(match &self.behavior {
            Behavior::CompleteAfter(n) if *count > *n => done,
            Behavior::CompleteAfter(_) | Behavior::NeverComplete => ProviderJobState::InProgress,
            Behavior::FailRequest(index, reason) if request_id == format!("req-{index}") => {
                ProviderJobState::Failed {
                    reason: reason.clone(),
                }
            }
            Behavior::FailRequest(..) => {
                if *count > 1 {
                    done
                } else {
                    ProviderJobState::Queued
                }
            }
        })
    }

    async fn fetch_result(&self, result_url: &str) -> Result<Vec<u8>, ProviderError> {
        Ok(result_url.as_bytes().to_vec())
    }
}

// ---------------------------------------------------------------------------
// Speech provider
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSpeech {
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeSpeech {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<SpeechSynthesis, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), voice_id.to_string()));
        let n = text.chars().count();
        Ok(SpeechSynthesis {
            audio: text.as_bytes().to_vec(),
            content_type: "audio/mpeg".to_string(),
            alignment: CharacterAlignment {
                characters: text.chars().map(String::from).collect(),
                start_times: (0..n).map(|i| i as f64 * 0.05).collect(),
                end_times: (0..n).map(|i| (i + 1) as f64 * 0.05).collect(),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Media engine
// ---------------------------------------------------------------------------

/// Writes placeholder files and reports configured durations.
///
/// Narration files are named `scene-{order}-narration.*`; their duration
/// comes from `narration_seconds[order]`.
pub struct FakeMedia {
    narration_seconds: HashMap<i32, f64>,
    pub combined: Mutex<Vec<PathBuf>>,
    pub subtitled: Mutex<Vec<(i32, Vec<WordTimestamp>)>>,
    pub music_mixed: Mutex<Option<f64>>,
    pub thumbnail_at: Mutex<Option<(f64, AspectRatio)>>,
    pub reconciled: Mutex<Vec<Reconciliation>>,
}

impl FakeMedia {
    pub fn new(narration_seconds: &[(i32, f64)]) -> Self {
        Self {
            narration_seconds: narration_seconds.iter().copied().collect(),
            combined: Mutex::new(Vec::new()),
            subtitled: Mutex::new(Vec::new()),
            music_mixed: Mutex::new(None),
            thumbnail_at: Mutex::new(None),
            reconciled: Mutex::new(Vec::new()),
        }
    }

    fn narration_order(path: &Path) -> Option<i32> {
        let name = path.file_name()?.to_str()?;
        let rest = name.strip_prefix("scene-")?;
        let (order, tail) = rest.split_once('-')?;
        tail.starts_with("narration").then(|| order.parse().ok())?
    }

    fn scene_order(path: &Path) -> i32 {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("scene-"))
            .and_then(|n| n.split('-').next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(-1)
    }
}

#[async_trait]
impl MediaEngine for FakeMedia {
    async fn media_duration(&self, path: &Path) -> Result<f64, FfmpegError> {
        if !path.exists() {
            return Err(FfmpegError::MediaNotFound(path.display().to_string()));
        }
        Ok(Self::narration_order(path)
            .and_then(|order| self.narration_seconds.get(&order).copied())
            .unwrap_or(CLIP_SECONDS))
    }

    async fn pad_audio(&self, input: &Path, output: &Path, _padding: &NarrationPadding) -> Result<(), FfmpegError> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn add_audio_to_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        _aspect: AspectRatio,
    ) -> Result<Reconciliation, FfmpegError> {
        let video_duration = self.media_duration(video).await?;
        let audio_duration = self.media_duration(audio).await?;
        let plan = Reconciliation::plan(video_duration, audio_duration)
            .map_err(|e| FfmpegError::ParseError(e.to_string()))?;
        tokio::fs::write(output, b"clip+audio").await?;
        self.reconciled.lock().unwrap().push(plan);
        Ok(plan)
    }

    async fn add_subtitles_to_video(
        &self,
        video: &Path,
        words: &[WordTimestamp],
        _style: &SubtitleStyle,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        tokio::fs::copy(video, output).await?;
        self.subtitled
            .lock()
            .unwrap()
            .push((Self::scene_order(output), words.to_vec()));
        Ok(())
    }

    async fn combine_videos(
        &self,
        clips: &[PathBuf],
        transition: &Transition,
        output: &Path,
    ) -> Result<f64, FfmpegError> {
        *self.combined.lock().unwrap() = clips.to_vec();
        tokio::fs::write(output, b"combined").await?;
        let durations = vec![CLIP_SECONDS; clips.len()];
        Ok(combined_duration(
            &durations,
            clamp_transition(transition.duration, &durations),
        ))
    }

    async fn add_music_to_video(
        &self,
        video: &Path,
        music: &Path,
        output: &Path,
        volume: f64,
    ) -> Result<(), FfmpegError> {
        if !music.exists() {
            return Err(FfmpegError::MediaNotFound(music.display().to_string()));
        }
        tokio::fs::copy(video, output).await?;
        *self.music_mixed.lock().unwrap() = Some(volume);
        Ok(())
    }

    async fn generate_thumbnail(
        &self,
        _video: &Path,
        at_seconds: f64,
        aspect: AspectRatio,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        tokio::fs::write(output, b"jpeg").await?;
        *self.thumbnail_at.lock().unwrap() = Some((at_seconds, aspect));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn scene(order: i32, voice_over: &str) -> Scene {
    Scene {
        id: format!("scene-{order}"),
        order,
        image_url: format!("https://img.test/scene-{order}.png"),
        image_description: format!("Scene {order} establishing shot"),
        voice_over: voice_over.to_string(),
        duration: None,
    }
}

pub fn project(scenes: Vec<Scene>, music: Option<&str>) -> Project {
    let now = Utc::now();
    Project {
        id: PROJECT_ID,
        user_id: USER_ID,
        status: ProjectStatus::Breakdown,
        breakdown: Some(Breakdown {
            scenes,
            music_description: music.map(str::to_string),
        }),
        settings: Some(ProjectSettings {
            video_model: VIDEO_MODEL.to_string(),
            aspect_ratio: AspectRatio::Landscape,
            style: "cinematic".to_string(),
            characters: Vec::new(),
            voice_id: None,
        }),
        history: Default::default(),
        video: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn two_scene_project() -> Project {
    project(
        vec![
            scene(1, "A dog waits by the harbor."),
            scene(2, "The boats come home at dusk, and the dog runs to meet them."),
        ],
        None,
    )
}

pub fn request() -> VideoJobRequest {
    VideoJobRequest {
        job_id: uuid::Uuid::now_v7(),
        project_id: PROJECT_ID,
        user_id: USER_ID,
    }
}

/// A pipeline wired to fakes, with handles to inspect them.
pub struct Harness {
    pub pipeline: VideoPipeline,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub video: Arc<FakeGeneration>,
    pub music: Arc<FakeGeneration>,
    pub speech: Arc<FakeSpeech>,
    pub media: Arc<FakeMedia>,
    pub events: Arc<EventBus>,
    pub clock: Arc<ManualClock>,
    pub work_dir: tempfile::TempDir,
}

pub struct HarnessBuilder {
    project: Project,
    video: Behavior,
    storage: MemoryStorage,
    narration_seconds: Vec<(i32, f64)>,
    max_attempts: u32,
    music_model: Option<String>,
}

impl HarnessBuilder {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            video: Behavior::CompleteAfter(1),
            storage: MemoryStorage::default(),
            narration_seconds: Vec::new(),
            max_attempts: 120,
            music_model: Some(MUSIC_MODEL.to_string()),
        }
    }

    pub fn video(mut self, behavior: Behavior) -> Self {
        self.video = behavior;
        self
    }

    pub fn storage(mut self, storage: MemoryStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn narration(mut self, seconds: &[(i32, f64)]) -> Self {
        self.narration_seconds = seconds.to_vec();
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::with(self.project));
        let storage = Arc::new(self.storage);
        let video = Arc::new(FakeGeneration::new(self.video));
        let music = Arc::new(FakeGeneration::new(Behavior::CompleteAfter(0)));
        let speech = Arc::new(FakeSpeech::default());
        let media = Arc::new(FakeMedia::new(&self.narration_seconds));
        let events = Arc::new(EventBus::default());
        let clock = Arc::new(ManualClock::new());
        let work_dir = tempfile::tempdir().unwrap();

        let registry = ProviderRegistry::new()
            .with(VIDEO_MODEL, video.clone())
            .with(MUSIC_MODEL, music.clone());

        let deps = PipelineDeps {
            store: store.clone(),
            storage: storage.clone(),
            registry,
            speech: speech.clone(),
            media: media.clone(),
            events: events.clone(),
            clock: clock.clone(),
        };
        let config = PipelineConfig {
            work_dir: work_dir.path().to_path_buf(),
            poll: PollPolicy {
                interval: Duration::from_secs(10),
                max_attempts: self.max_attempts,
            },
            music_model: self.music_model,
            ..PipelineConfig::default()
        };

        Harness {
            pipeline: VideoPipeline::new(deps, config),
            store,
            storage,
            video,
            music,
            speech,
            media,
            events,
            clock,
            work_dir,
        }
    }
}

impl Harness {
    pub fn project(&self) -> Project {
        self.store.get(PROJECT_ID)
    }

    /// Entries left in the scratch root.
    pub fn work_dir_entries(&self) -> usize {
        std::fs::read_dir(self.work_dir.path()).unwrap().count()
    }
}
