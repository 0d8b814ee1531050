//! Video pipeline worker.
//!
//! Consumes the `video_jobs` queue and runs one pipeline invocation per
//! claimed job. Stops claiming on Ctrl-C and exits once in-flight jobs
//! have finished.
//!
//! # Environment variables
//!
//! | Variable             | Required | Default            | Description                       |
//! |----------------------|----------|--------------------|-----------------------------------|
//! | `DATABASE_URL`       | yes      | --                 | PostgreSQL connection string      |
//! | `GENERATION_API_URL` | yes      | --                 | Queue-based generation API root   |
//! | `GENERATION_MODELS`  | yes      | --                 | Comma-separated video model ids   |
//! | `TTS_API_URL`        | yes      | --                 | Speech synthesis API root         |
//! | `STORAGE_BUCKET`     | yes      | --                 | Bucket for generated media        |
//! | `WORKER_CONCURRENCY` | no       | `2`                | Concurrent pipeline invocations   |
//! | `QUEUE_NAME`         | no       | `video-generation` | Queue to consume                  |
//! | `LOG_FORMAT`         | no       | `text`             | `text` or `json`                  |
//! | `RUST_LOG`           | no       | `storyreel_worker=info,...` | Tracing filter           |
//!
//! See [`WorkerConfig::from_env`] for the full list.

use std::sync::Arc;

use anyhow::Context;
use storyreel_events::{EventBus, EventLogger};
use storyreel_worker::config::{LogFormat, WorkerConfig};
use storyreel_worker::pool::WorkerPool;
use storyreel_worker::{setup, telemetry};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    telemetry::init(LogFormat::from_env());

    if let Err(e) = run().await {
        tracing::error!(error = ?e, "Worker failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        queue = %config.queue_name,
        concurrency = config.concurrency,
        work_dir = %config.work_dir.display(),
        "Loaded worker configuration",
    );

    if !config.binaries.available().await {
        anyhow::bail!(
            "Media tools not runnable: {} / {}",
            config.binaries.ffmpeg.display(),
            config.binaries.ffprobe.display()
        );
    }

    // --- Database ---
    let pool = storyreel_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    storyreel_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    storyreel_db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database ready");

    // --- Events ---
    let events = Arc::new(EventBus::default());
    let logger = tokio::spawn(EventLogger::run(events.subscribe()));

    // --- Pipeline ---
    let pipeline = setup::build_pipeline(&config, pool.clone(), Arc::clone(&events))
        .await
        .context("Failed to build pipeline")?;
    let worker = WorkerPool::new(pool, Arc::new(pipeline), &config);

    // --- Shutdown ---
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    worker.run(cancel).await;

    // Last senders gone: the logger drains and exits.
    drop(worker);
    drop(events);
    let _ = logger.await;

    tracing::info!("Worker stopped");
    Ok(())
}
