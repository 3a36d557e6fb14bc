use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error::{Result, UploadError};
use crate::part::{PartAssignment, PartResult, PartStatus, PartTransport, PartUploader, SourceFile};
use crate::planner;
use crate::progress::ProgressObserver;
use crate::retry::RetryPolicy;
use crate::session::{CompletedPart, UploadSession};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Per-part results of one run, ordered by part number.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub parts: Vec<PartResult>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.parts.iter().all(|part| part.status == PartStatus::Succeeded)
    }

    pub fn failed_parts(&self) -> Vec<u32> {
        self.parts
            .iter()
            .filter(|part| part.status != PartStatus::Succeeded)
            .map(|part| part.part_number)
            .collect()
    }

    /// The (part number, token) pairs ready for finalize, or every failed part number.
    pub fn completed_parts(&self) -> Result<Vec<CompletedPart>> {
        let failed = self.failed_parts();
        if !failed.is_empty() {
            return Err(UploadError::PartsFailed(failed));
        }

        self.parts
            .iter()
            .map(|part| {
                Ok(CompletedPart {
                    part_number: part.part_number,
                    integrity_token: part.token()?.to_string(),
                })
            })
            .collect()
    }
}

pub struct UploadCoordinator<'a, T> {
    transport: &'a T,
    policy: RetryPolicy,
    concurrency: usize,
    progress: &'a dyn ProgressObserver,
}

impl<'a, T: PartTransport> UploadCoordinator<'a, T> {
    pub fn new(
        transport: &'a T,
        policy: RetryPolicy,
        concurrency: usize,
        progress: &'a dyn ProgressObserver,
    ) -> Self {
        Self {
            transport,
            policy,
            concurrency: concurrency.max(1),
            progress,
        }
    }

    /// Uploads every part of `session` with at most `concurrency` in flight.
    /// A failed part never cancels its siblings.
    pub async fn run(&self, session: &UploadSession, source: &SourceFile) -> Result<UploadOutcome> {
        if source.len() != session.total_size {
            return Err(UploadError::InvalidInput(format!(
                "source is {} bytes but the session expects {}",
                source.len(),
                session.total_size
            )));
        }
        if session.part_endpoints.len() != session.part_count as usize {
            return Err(UploadError::InvalidInput(format!(
                "session lists {} endpoints for {} parts",
                session.part_endpoints.len(),
                session.part_count
            )));
        }

        let ranges = planner::plan(session.total_size, session.part_count)?;
        let assignments = session
            .part_endpoints
            .iter()
            .zip(ranges)
            .map(|(endpoint, range)| PartAssignment {
                part_number: endpoint.part_number,
                range,
                url: endpoint.url.clone(),
            });

        info!(
            upload_id = %session.session_id,
            parts = session.part_count,
            concurrency = self.concurrency,
            "uploading parts"
        );

        let uploader = PartUploader::new(self.transport, source, self.policy, self.progress);
        let mut parts = stream::iter(assignments)
            .map(|assignment| uploader.upload_part(assignment))
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;
        parts.sort_by_key(|part| part.part_number);

        let outcome = UploadOutcome { parts };
        if outcome.is_success() {
            info!(upload_id = %session.session_id, "all parts uploaded");
        } else {
            warn!(
                upload_id = %session.session_id,
                failed = ?outcome.failed_parts(),
                "some parts failed permanently"
            );
        }
        Ok(outcome)
    }
}
