//! Queue consumption against a real database.
//!
//! Run with `DATABASE_URL` pointing at a disposable PostgreSQL server and
//! `cargo test -p storyreel-worker -- --ignored`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use sqlx::PgPool;
use storyreel_core::capabilities::{
    ObjectStorage, ProviderError, SpeechProvider, SpeechSynthesis, StorageError,
};
use storyreel_core::project::{Project, ProjectStatus};
use storyreel_db::models::project::CreateProject;
use storyreel_db::models::status::VideoJobStatus;
use storyreel_db::repositories::{ProjectRepo, VideoJobRepo};
use storyreel_db::PgProjectStore;
use storyreel_events::EventBus;
use storyreel_pipeline::clock::TokioClock;
use storyreel_pipeline::{FfmpegEngine, PipelineConfig, PipelineDeps, VideoPipeline};
use storyreel_providers::ProviderRegistry;
use storyreel_worker::config::WorkerConfig;
use storyreel_worker::pool::{process_job, WorkerPool};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const QUEUE: &str = "video-generation";

/// Storage that must never be reached by the runs in this file.
struct NoStorage;

#[async_trait]
impl ObjectStorage for NoStorage {
    async fn upload_buffer(&self, _: Vec<u8>, key: &str, _: &str) -> Result<String, StorageError> {
        panic!("unexpected upload of {key}")
    }

    async fn download_file(&self, key: &str, _: &Path) -> Result<(), StorageError> {
        panic!("unexpected download of {key}")
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        panic!("unexpected delete of {key}")
    }
}

struct NoSpeech;

#[async_trait]
impl SpeechProvider for NoSpeech {
    async fn synthesize(&self, text: &str, _: &str) -> Result<SpeechSynthesis, ProviderError> {
        panic!("unexpected synthesis of {text:?}")
    }
}

fn pipeline(pool: &PgPool, work_dir: &Path) -> Arc<VideoPipeline> {
    let deps = PipelineDeps {
        store: Arc::new(PgProjectStore::new(pool.clone())),
        storage: Arc::new(NoStorage),
        registry: ProviderRegistry::new(),
        speech: Arc::new(NoSpeech),
        media: Arc::new(FfmpegEngine::default()),
        events: Arc::new(EventBus::default()),
        clock: Arc::new(TokioClock),
    };
    let config = PipelineConfig {
        work_dir: work_dir.to_path_buf(),
        ..PipelineConfig::default()
    };
    Arc::new(VideoPipeline::new(deps, config))
}

fn worker_config(database_url: &str) -> WorkerConfig {
    let vars = [
        ("DATABASE_URL", database_url),
        ("QUEUE_POLL_INTERVAL_MS", "10"),
        ("GENERATION_API_URL", "https://queue.gen.test"),
        ("GENERATION_API_KEY", "k"),
        ("GENERATION_MODELS", "kling-v2"),
        ("TTS_API_URL", "https://tts.test"),
        ("TTS_API_KEY", "k"),
        ("STORAGE_BUCKET", "media"),
        ("STORAGE_PUBLIC_URL", "https://cdn.test"),
    ];
    WorkerConfig::from_lookup(|name| {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    })
    .unwrap()
}

/// A project that fails validation: it has no breakdown.
async fn unplanned_project(pool: &PgPool) -> Project {
    let input = CreateProject {
        user_id: 21,
        status: ProjectStatus::Storyboard,
        breakdown: None,
        settings: None,
    };
    let row = ProjectRepo::create(pool, &input).await.unwrap();
    Project::try_from(row).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// A pipeline failure settles the queue row as failed with the error
/// message and marks the project failed.
#[sqlx::test(migrations = "../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failed_run_settles_job_and_project(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let project = unplanned_project(&pool).await;
    VideoJobRepo::enqueue(&pool, QUEUE, project.id, project.user_id)
        .await
        .unwrap();
    let job = VideoJobRepo::claim_next(&pool, QUEUE).await.unwrap().unwrap();

    process_job(&pool, &pipeline(&pool, dir.path()), job.clone()).await;

    let settled = VideoJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(settled.status(), Some(VideoJobStatus::Failed));
    assert_matches!(settled.error_message.as_deref(), Some(msg) if msg.contains("breakdown"));
    assert!(settled.finished_at.is_some());

    let row = ProjectRepo::find_by_id(&pool, project.id).await.unwrap().unwrap();
    assert_eq!(Project::try_from(row).unwrap().status, ProjectStatus::Failed);
}

/// The pool claims queued jobs on its own and stops when cancelled.
#[sqlx::test(migrations = "../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn pool_drains_queue_and_stops_on_cancel(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let mut jobs = Vec::new();
    for _ in 0..3 {
        let project = unplanned_project(&pool).await;
        let job = VideoJobRepo::enqueue(&pool, QUEUE, project.id, project.user_id)
            .await
            .unwrap();
        jobs.push(job.id);
    }

    let worker = WorkerPool::new(
        pool.clone(),
        pipeline(&pool, dir.path()),
        &worker_config("postgres://unused"),
    );
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let mut settled = 0;
        for id in &jobs {
            let job = VideoJobRepo::find_by_id(&pool, *id).await.unwrap().unwrap();
            if job.finished_at.is_some() {
                settled += 1;
            }
        }
        if settled == jobs.len() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "jobs were not processed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pool did not stop")
        .unwrap();
}

/// A job is delivered once: a failed job is not claimed again.
#[sqlx::test(migrations = "../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failed_job_is_not_redelivered(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let project = unplanned_project(&pool).await;
    VideoJobRepo::enqueue(&pool, QUEUE, project.id, project.user_id)
        .await
        .unwrap();

    let job = VideoJobRepo::claim_next(&pool, QUEUE).await.unwrap().unwrap();
    process_job(&pool, &pipeline(&pool, dir.path()), job).await;

    assert!(VideoJobRepo::claim_next(&pool, QUEUE).await.unwrap().is_none());
}
