//! Video notes worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vnote_queue::JobQueue;
use vnote_storage::S3Client;
use vnote_store::PgJobStore;
use vnote_worker::{
    GeminiClient, JobExecutor, Pipeline, StorageMediaRetrieval, WorkerConfig,
};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,vnote=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn build_executor(config: WorkerConfig) -> anyhow::Result<JobExecutor> {
    vnote_media::check_ffmpeg()?;

    let store = PgJobStore::from_env().await?;
    store.ensure_schema().await?;

    let storage = Arc::new(S3Client::from_env()?);
    let media = Arc::new(StorageMediaRetrieval::new(storage, config.ffmpeg_timeout));
    let transcriber = vnote_speech::from_env()?;
    let gemini = Arc::new(GeminiClient::from_env()?);

    let pipeline = Pipeline::new(
        Arc::new(store),
        media,
        transcriber,
        gemini.clone(),
        gemini,
        config.work_dir.clone(),
    );
    let queue = JobQueue::from_env()?;

    Ok(JobExecutor::new(config, queue, pipeline))
}

#[tokio::main]
async fn main() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting vnote-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match vnote_worker::metrics::install_exporter(addr) {
            Ok(()) => info!("Metrics exporter listening on {}", addr),
            Err(e) => error!("Failed to install metrics exporter: {}", e),
        }
    }

    let executor = match build_executor(config).await {
        Ok(executor) => executor,
        Err(e) => {
            error!("Failed to start worker: {:#}", e);
            std::process::exit(1);
        }
    };

    let shutdown = executor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown.send(true);
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
