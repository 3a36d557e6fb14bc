//! One complete upload run: initialize, upload every part, finalize, and
//! optionally register the committed object.
//!
//! Handshake and finalize errors end the run at their phase. A failed
//! registration is recorded on the report and never undoes a finalize.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::{Handshake, InitializeRequest, PrepareStage};
use crate::coordinator::{DEFAULT_CONCURRENCY, UploadCoordinator};
use crate::error::{Result, UploadError};
use crate::part::{PartTransport, SourceFile};
use crate::progress::ProgressObserver;
use crate::retry::{self, RetryPolicy};
use crate::session::{
    CommitResult, FileMetadata, FinalizeRequest, Phase, Registration, RegistrationIdentity,
    RegistrationReceipt, UploadSession,
};

pub const DEFAULT_FINALIZE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub concurrency: usize,
    pub part_retry: RetryPolicy,
    pub finalize_retry: RetryPolicy,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            part_retry: RetryPolicy::default(),
            finalize_retry: RetryPolicy::new(DEFAULT_FINALIZE_ATTEMPTS, Duration::from_secs(1)),
        }
    }
}

/// What to upload and how to describe it to the platform.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub path: PathBuf,
    pub name: String,
    pub parent_version_id: u64,
    pub bucket: String,
    pub object_type: String,
    pub metadata: FileMetadata,
    pub identity: RegistrationIdentity,
    pub register: bool,
}

#[derive(Debug)]
pub enum RegistrationStatus {
    Skipped,
    Registered(RegistrationReceipt),
    Failed(UploadError),
}

#[derive(Debug)]
pub struct UploadReport {
    pub session: UploadSession,
    pub phase: Phase,
    pub commit: CommitResult,
    pub registration: RegistrationStatus,
}

pub async fn run_upload<H, T>(
    handshake: &H,
    transport: &T,
    job: &UploadJob,
    settings: &UploadSettings,
    progress: &dyn ProgressObserver,
) -> Result<UploadReport>
where
    H: Handshake,
    T: PartTransport,
{
    let source = SourceFile::open(&job.path).await?;
    if source.is_empty() {
        return Err(UploadError::InvalidInput(format!(
            "{} is empty",
            job.path.display()
        )));
    }

    handshake
        .prepare(PrepareStage::Initialize {
            version_id: job.parent_version_id,
        })
        .await;
    let session = handshake
        .initialize(&InitializeRequest {
            filename: job.name.clone(),
            size: source.len(),
            object_type: job.object_type.clone(),
            parent_id: job.parent_version_id,
        })
        .await?;
    let mut phase = Phase::Initialized;

    phase = phase.begin_parts()?;
    let coordinator =
        UploadCoordinator::new(transport, settings.part_retry, settings.concurrency, progress);
    let parts = match coordinator
        .run(&session, &source)
        .await
        .and_then(|outcome| outcome.completed_parts())
    {
        Ok(parts) => parts,
        Err(e) => return Err(abort(handshake, &session, phase, e).await),
    };

    let request = FinalizeRequest::new(&session, parts);
    handshake.prepare(PrepareStage::Finalize).await;
    let commit = match retry::retry_result(&settings.finalize_retry, |attempt| {
        info!(upload_id = %session.session_id, attempt, "finalizing upload");
        handshake.finalize(&request)
    })
    .await
    {
        Ok(commit) => commit,
        Err(e) => return Err(abort(handshake, &session, phase, e).await),
    };
    phase = phase.finalize()?;

    let registration = if job.register {
        register(handshake, &session, job).await
    } else {
        RegistrationStatus::Skipped
    };

    Ok(UploadReport {
        session,
        phase,
        commit,
        registration,
    })
}

/// Moves a run that cannot reach finalize into `Aborted` and hands back the
/// error that stopped it.
async fn abort<H: Handshake>(
    handshake: &H,
    session: &UploadSession,
    phase: Phase,
    error: UploadError,
) -> UploadError {
    match phase.abort() {
        Ok(phase) => {
            warn!(upload_id = %session.session_id, %phase, error = %error, "upload aborted");
            handshake.abort(session).await;
            error
        }
        Err(transition) => transition,
    }
}

async fn register<H: Handshake>(
    handshake: &H,
    session: &UploadSession,
    job: &UploadJob,
) -> RegistrationStatus {
    let registration = match Registration::new(
        session,
        &job.bucket,
        &job.object_type,
        job.parent_version_id,
        &job.name,
        job.metadata.clone(),
        &job.identity,
    ) {
        Ok(registration) => registration,
        Err(e) => return RegistrationStatus::Failed(e),
    };

    match handshake.register(&registration).await {
        Ok(receipt) => RegistrationStatus::Registered(receipt),
        Err(e) => {
            warn!(key = %session.object_key, error = %e, "registration failed");
            RegistrationStatus::Failed(e)
        }
    }
}
