//! Upload session state shared by the handshake calls and the part workers.
//!
//! An [`UploadSession`] is produced once by the initialize call and never
//! mutated afterwards. The run's progress through the protocol is tracked by
//! [`Phase`], and the finalize and registration payloads are assembled from
//! the session plus the collected integrity tokens.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{Result, UploadError};
use crate::rest_types::InitUploadResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartEndpoint {
    pub part_number: u32,
    pub url: Url,
}

#[derive(Debug, Clone)]
pub struct UploadSession {
    pub session_id: String,
    pub object_key: String,
    pub total_size: u64,
    pub part_count: u32,
    pub part_endpoints: Vec<PartEndpoint>,
    pub server_uuid: Option<String>,
}

impl UploadSession {
    pub fn from_init_response(response: InitUploadResponse, total_size: u64) -> Result<Self> {
        let session_id = response
            .upload_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing_field("uploadId"))?;
        let object_key = response
            .key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| missing_field("key"))?;
        let urls = response
            .urls
            .filter(|urls| !urls.is_empty())
            .ok_or_else(|| missing_field("urls"))?;

        let part_endpoints = urls
            .into_iter()
            .enumerate()
            .map(|(index, part)| {
                let url = Url::parse(&part.url).map_err(|e| {
                    UploadError::Handshake(format!("part {} has an invalid url: {}", index + 1, e))
                })?;
                Ok(PartEndpoint {
                    part_number: index as u32 + 1,
                    url,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            session_id,
            object_key,
            total_size,
            part_count: part_endpoints.len() as u32,
            part_endpoints,
            server_uuid: response.uuid.filter(|uuid| !uuid.is_empty()),
        })
    }
}

fn missing_field(field: &str) -> UploadError {
    UploadError::Handshake(format!("initialize response is missing `{}`", field))
}

/// Protocol phase of one upload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialized,
    PartsUploading,
    Finalized,
    Aborted,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Initialized => write!(f, "Initialized"),
            Phase::PartsUploading => write!(f, "Uploading parts"),
            Phase::Finalized => write!(f, "Finalized"),
            Phase::Aborted => write!(f, "Aborted"),
        }
    }
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finalized | Phase::Aborted)
    }

    pub fn begin_parts(self) -> Result<Phase> {
        match self {
            Phase::Initialized => Ok(Phase::PartsUploading),
            other => Err(illegal_transition(other, Phase::PartsUploading)),
        }
    }

    pub fn finalize(self) -> Result<Phase> {
        match self {
            Phase::PartsUploading => Ok(Phase::Finalized),
            other => Err(illegal_transition(other, Phase::Finalized)),
        }
    }

    pub fn abort(self) -> Result<Phase> {
        if self.is_terminal() {
            return Err(illegal_transition(self, Phase::Aborted));
        }
        Ok(Phase::Aborted)
    }
}

fn illegal_transition(from: Phase, to: Phase) -> UploadError {
    UploadError::Handshake(format!("illegal phase transition {} -> {}", from, to))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub integrity_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeRequest {
    pub session_id: String,
    pub object_key: String,
    pub parts: Vec<CompletedPart>,
}

impl FinalizeRequest {
    /// Assembles the commit payload; parts are ordered by part number regardless
    /// of the order they completed in.
    pub fn new(session: &UploadSession, mut parts: Vec<CompletedPart>) -> Self {
        parts.sort_by_key(|part| part.part_number);
        Self {
            session_id: session.session_id.clone(),
            object_key: session.object_key.clone(),
            parts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileMetadata {
    pub format: String,
    pub precision: String,
    pub size_class: String,
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self {
            format: "SafeTensor".to_string(),
            precision: "fp16".to_string(),
            size_class: "pruned".to_string(),
        }
    }
}

/// Which identifier the registration call presents for the uploaded object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationIdentity {
    #[default]
    ServerUuid,
    UploadId,
    Fixed(Uuid),
}

impl RegistrationIdentity {
    pub fn resolve(&self, session: &UploadSession) -> Result<String> {
        match self {
            RegistrationIdentity::ServerUuid => session.server_uuid.clone().ok_or_else(|| {
                UploadError::Registration(
                    "server did not issue a uuid; set registration_identity to \"upload-id\" or a fixed uuid"
                        .to_string(),
                )
            }),
            RegistrationIdentity::UploadId => Ok(session.session_id.clone()),
            RegistrationIdentity::Fixed(uuid) => Ok(uuid.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub bucket: String,
    pub object_key: String,
    pub metadata: FileMetadata,
    pub parent_version_id: u64,
    pub name: String,
    pub size_kb: f64,
    pub object_type: String,
    pub url: String,
    pub identity: String,
}

impl Registration {
    pub fn new(
        session: &UploadSession,
        bucket: &str,
        object_type: &str,
        parent_version_id: u64,
        name: &str,
        metadata: FileMetadata,
        identity: &RegistrationIdentity,
    ) -> Result<Self> {
        Ok(Self {
            bucket: bucket.to_string(),
            object_key: session.object_key.clone(),
            metadata,
            parent_version_id,
            name: name.to_string(),
            size_kb: session.total_size as f64 / 1024.0,
            object_type: object_type.to_string(),
            url: object_url(bucket, &session.object_key),
            identity: identity.resolve(session)?,
        })
    }
}

pub fn object_url(bucket: &str, key: &str) -> String {
    format!("https://{}.s3.amazonaws.com/{}", bucket, key)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub status: u16,
    pub body: String,
}
