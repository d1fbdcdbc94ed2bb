use std::path::Path;

use vnote_worker::{GeminiConfig, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    let ffmpeg = vnote_media::check_ffmpeg()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    println!("worker-selfcheck: ffmpeg at {}", ffmpeg.display());
    ensure_env_present(&[
        "REDIS_URL",
        "DATABASE_URL",
        "STORAGE_BUCKET",
        "STORAGE_ACCESS_KEY_ID",
        "STORAGE_SECRET_ACCESS_KEY",
    ])?;

    let storage = vnote_storage::S3Client::from_env()?;
    storage
        .check_connectivity()
        .await
        .map_err(|e| anyhow::anyhow!("bucket {} not reachable: {}", storage.bucket(), e))?;
    println!("worker-selfcheck: bucket {} reachable", storage.bucket());

    // Provider credentials are only checked on first use by the worker
    if GeminiConfig::from_env().api_key.is_none() {
        println!("worker-selfcheck: warning: GEMINI_API_KEY not set, summaries will fail");
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
