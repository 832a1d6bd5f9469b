//! kappa-pan - Chunked upload client for the 123pan open API
//!
//! Uploads a local file into a remote folder, riding out transient chunk
//! failures and waiting out asynchronous merges.

use clap::{Parser, Subcommand};
use kappa_pan::upload::{AsyncPollStatus, UploadEvent, UploadOutcome, Uploader};
use kappa_pan::{ApiClient, Config};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// kappa-pan - Resumable chunked uploads to 123pan
#[derive(Parser, Debug)]
#[command(name = "kappa-pan")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file into a remote folder
    Upload {
        /// Local file to upload
        file: PathBuf,

        /// Destination folder id (0 is the root folder)
        #[arg(short, long, default_value_t = 0)]
        parent_id: i64,

        /// Remote filename; defaults to the local file name
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting kappa-pan v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    let client = ApiClient::from_config(&config.api)?;

    match args.command {
        Command::Upload {
            file,
            parent_id,
            name,
        } => {
            let filename = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("file path has no usable name"))?,
            };

            let mut handle = tokio::fs::File::open(&file).await?;
            let uploader = Uploader::new(&client).with_retry_limit(config.upload.retry_limit);

            let mut sink = |event: UploadEvent| match event {
                UploadEvent::CreatingSession => info!("Creating upload session"),
                UploadEvent::ChunkStarted { sequence, total } => {
                    info!("Uploading chunk {sequence}/{total}")
                }
                UploadEvent::ChunkRetried {
                    sequence,
                    total,
                    attempt,
                } => info!("Retrying chunk {sequence}/{total} (retry {attempt})"),
                UploadEvent::Verifying { total } => info!("Verifying {total} uploaded chunks"),
                UploadEvent::Completing => info!("Finalizing upload"),
            };

            let outcome = uploader
                .upload_with_progress(parent_id, &filename, &mut handle, &mut sink)
                .await?;

            match outcome {
                UploadOutcome::Reused { file_id } => {
                    info!(file_id, "Instant upload: content already present")
                }
                UploadOutcome::Completed { file_id } => info!(file_id, "Upload complete"),
                UploadOutcome::AsyncPending { preupload_id } => {
                    info!("Server is merging chunks, polling for the result");
                    let interval = Duration::from_secs(config.upload.poll_interval_secs);
                    loop {
                        tokio::time::sleep(interval).await;
                        match uploader.poll_async_result(&preupload_id).await? {
                            AsyncPollStatus::Pending => debug!("Merge still pending"),
                            AsyncPollStatus::Completed { file_id } => {
                                info!(file_id, "Upload complete");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
