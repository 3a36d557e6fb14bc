//! Chunked multipart uploads to a content-hosting platform.
//!
//! A run initializes an upload session, pushes every byte range of the source
//! file to its presigned part URL under bounded concurrency with per-part
//! retry, commits the collected integrity tokens, and registers the resulting
//! object's metadata.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod part;
pub mod planner;
pub mod progress;
pub mod rest_types;
pub mod retry;
pub mod serde_utils;
pub mod session;
#[cfg(test)]
mod stub_server;
pub mod upload;

pub use client::{Credentials, Handshake, PlatformClient, PlatformConfig, PrepareStage};
pub use coordinator::{UploadCoordinator, UploadOutcome};
pub use error::{Result, UploadError};
pub use part::{HttpPartTransport, PartTransport, SourceFile};
pub use progress::{ByteCounter, ProgressObserver};
pub use upload::{RegistrationStatus, UploadJob, UploadReport, UploadSettings, run_upload};
