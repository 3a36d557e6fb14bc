use std::{
    future::Future,
    io::SeekFrom,
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::{Client, StatusCode, header::ETAG};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, UploadError};
use crate::planner::ByteRange;
use crate::progress::ProgressObserver;
use crate::retry::{self, RetryPolicy};
use crate::serde_utils::unquote_etag;

/// Read-only handle description of the file being uploaded.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    len: u64,
}

impl SourceFile {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(UploadError::InvalidInput(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            path,
            len: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads exactly `range.len()` bytes through a handle private to this call.
    pub async fn read_range(&self, range: ByteRange) -> Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(range.start)).await?;
        let mut buffer = vec![0u8; range.len() as usize];
        file.read_exact(&mut buffer).await?;
        Ok(buffer)
    }
}

/// Sends one part body to its destination and returns the raw integrity token.
pub trait PartTransport: Send + Sync {
    fn put_part(&self, url: &Url, body: Vec<u8>) -> impl Future<Output = Result<String>> + Send;
}

/// PUTs part bodies to presigned object-storage URLs.
#[derive(Clone)]
pub struct HttpPartTransport {
    client: Client,
}

impl HttpPartTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| UploadError::InvalidInput(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl PartTransport for HttpPartTransport {
    async fn put_part(&self, url: &Url, body: Vec<u8>) -> Result<String> {
        let response = self
            .client
            .put(url.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::TransientNetwork(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(UploadError::TransientNetwork(format!(
                "part upload returned {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::TransientNetwork("part upload response has no ETag".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PartResult {
    pub part_number: u32,
    pub range: ByteRange,
    pub integrity_token: Option<String>,
    pub attempts: u32,
    pub status: PartStatus,
    pub last_error: Option<String>,
}

impl PartResult {
    pub fn pending(part_number: u32, range: ByteRange) -> Self {
        Self {
            part_number,
            range,
            integrity_token: None,
            attempts: 0,
            status: PartStatus::Pending,
            last_error: None,
        }
    }

    pub fn token(&self) -> Result<&str> {
        match (&self.status, &self.integrity_token) {
            (PartStatus::Succeeded, Some(token)) => Ok(token.as_str()),
            _ => Err(UploadError::PermanentPartFailure(self.part_number)),
        }
    }
}

/// One unit of work for the coordinator's pool.
#[derive(Debug, Clone)]
pub struct PartAssignment {
    pub part_number: u32,
    pub range: ByteRange,
    pub url: Url,
}

pub struct PartUploader<'a, T> {
    transport: &'a T,
    source: &'a SourceFile,
    policy: RetryPolicy,
    progress: &'a dyn ProgressObserver,
}

impl<'a, T: PartTransport> PartUploader<'a, T> {
    pub fn new(
        transport: &'a T,
        source: &'a SourceFile,
        policy: RetryPolicy,
        progress: &'a dyn ProgressObserver,
    ) -> Self {
        Self {
            transport,
            source,
            policy,
            progress,
        }
    }

    pub async fn upload_part(&self, assignment: PartAssignment) -> PartResult {
        let mut result = PartResult::pending(assignment.part_number, assignment.range);

        let attempted = retry::retry(&self.policy, |attempt| {
            let assignment = &assignment;
            async move {
                debug!(part = assignment.part_number, attempt, "uploading part");
                let body = self.source.read_range(assignment.range).await?;
                let raw = self.transport.put_part(&assignment.url, body).await?;
                Ok(unquote_etag(&raw))
            }
        })
        .await;

        result.attempts = attempted.attempts;
        match attempted.result {
            Ok(token) => {
                self.progress.on_bytes(assignment.range.len());
                debug!(part = assignment.part_number, attempts = result.attempts, "part uploaded");
                result.integrity_token = Some(token);
                result.status = PartStatus::Succeeded;
            }
            Err(err) => {
                warn!(
                    part = assignment.part_number,
                    attempts = result.attempts,
                    error = %err,
                    "part failed permanently"
                );
                result.last_error = Some(err.to_string());
                result.status = PartStatus::Failed;
            }
        }
        result
    }
}
