use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use iocraft::prelude::*;
use mput::{
    ByteCounter, HttpPartTransport, PlatformClient, RegistrationStatus, UploadError, UploadJob,
    run_upload,
};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::ui::{ErrorMessage, ProgressBar, SuccessMessage, UploadSummary, UploadSummaryProps};

mod config;
mod ui;

#[derive(Parser)]
#[command(name = "mput")]
#[command(version)]
#[command(about = "Upload large model files to a content-hosting platform")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and register it against a model version
    Upload {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Model version the file belongs to (defaults to the configured version_id)
        #[arg(short, long)]
        version_id: Option<u64>,
        /// Display name of the file (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
        /// Number of parts uploaded concurrently
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Commit the upload without registering file metadata
        #[arg(long)]
        no_register: bool,
    },
    /// Store your session credentials in the OS keyring
    SetToken {
        session_token: String,
        #[arg(long)]
        csrf_token: Option<String>,
    },
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let _rt_guard = rt.enter();
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    rt.block_on(async {
        match cli.command {
            Commands::SetToken {
                session_token,
                csrf_token,
            } => config::set_credentials_keyring(session_token, csrf_token),
            Commands::Upload {
                file,
                version_id,
                name,
                concurrency,
                no_register,
            } => {
                let config = config::read_config()?;
                upload_file(config, &file, version_id, name, concurrency, !no_register).await
            }
        }
    })
}

async fn upload_file(
    mut config: config::Config,
    file: &Path,
    version_id: Option<u64>,
    name: Option<String>,
    concurrency: Option<usize>,
    register: bool,
) -> Result<()> {
    let file_size = std::fs::metadata(file)
        .context("Failed to get file metadata")?
        .len();

    let version_id = version_id.or(config.version_id).ok_or_else(|| {
        anyhow!("A model version must be specified via --version-id or configured as version_id")
    })?;
    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Unable to derive a file name from {}", file.display()))?,
    };
    if let Some(concurrency) = concurrency {
        if concurrency == 0 {
            bail!("--concurrency must be at least 1");
        }
        config.settings.concurrency = concurrency;
    }

    let job = UploadJob {
        path: file.to_path_buf(),
        name: name.clone(),
        parent_version_id: version_id,
        bucket: config.platform.bucket.clone(),
        object_type: config.platform.object_type.clone(),
        metadata: config.metadata.clone(),
        identity: config.identity.clone(),
        register,
    };

    let transport = HttpPartTransport::new(config.platform.request_timeout)?;
    let client = PlatformClient::new(config.platform, config.credentials)?;

    let (tx, rx) = watch::channel(0.0);
    let progress = ByteCounter::with_percent_channel(file_size, tx);
    let pipeline = run_upload(&client, &transport, &job, &config.settings, &progress);

    let mut progress_bar =
        element!(ProgressBar(title: format!("Uploading {}", name), progress: Some(rx)));

    let result = tokio::select! {
        result = pipeline => result,
        _ = progress_bar.render_loop() => {
            bail!("Progress display exited before the upload finished")
        }
    };
    println!();

    match result {
        Ok(report) => {
            let summary = UploadSummaryProps::from_report(&report);
            element!(UploadSummary(
                upload_id: summary.upload_id,
                object_key: summary.object_key,
                parts: summary.parts,
                commit_status: summary.commit_status,
                registration: summary.registration,
                registered: summary.registered,
            ))
            .print();
            match &report.registration {
                RegistrationStatus::Failed(e) => {
                    element!(ErrorMessage(message: format!(
                        "File committed but registration failed: {}",
                        e
                    )))
                    .print();
                    bail!("Registration failed");
                }
                _ => {
                    element!(SuccessMessage(message: "Upload complete".to_string())).print();
                }
            }
            Ok(())
        }
        Err(UploadError::PartsFailed(parts)) => {
            element!(ErrorMessage(message: format!(
                "Parts {:?} failed permanently; restart the upload",
                parts
            )))
            .print();
            bail!("Upload incomplete")
        }
        Err(e) => {
            element!(ErrorMessage(message: e.to_string())).print();
            Err(e.into())
        }
    }
}
