//! Error types for chunked uploads
//!
//! Covers input validation, per-part transfer failures and the
//! protocol-level rejections of the handshake calls.

use thiserror::Error;

/// Primary error type for all upload operations
#[derive(Debug, Error)]
pub enum UploadError {
    /// Bad size, part count or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport failure that may succeed on another attempt
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Retry budget exhausted for a single part
    #[error("Part {0} failed permanently")]
    PermanentPartFailure(u32),

    /// One or more parts failed permanently; sorted ascending
    #[error("Parts failed permanently: {0:?}")]
    PartsFailed(Vec<u32>),

    /// Initialize rejected by the remote or malformed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Commit of the uploaded parts rejected by the remote
    #[error("Finalize failed: {0}")]
    Finalize(String),

    /// Post-finalize metadata registration failed
    #[error("Registration failed: {0}")]
    Registration(String),

    /// Source file access
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Returns true if the operation that produced this error may be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::TransientNetwork(_) | UploadError::Io(_) | UploadError::Finalize(_)
        )
    }
}

/// Result type alias for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_rejections_are_not_retryable() {
        assert!(!UploadError::Handshake("400".into()).is_retryable());
        assert!(!UploadError::Registration("500".into()).is_retryable());
        assert!(!UploadError::InvalidInput("zero".into()).is_retryable());
        assert!(!UploadError::PermanentPartFailure(3).is_retryable());
    }

    #[test]
    fn transport_failures_are_retryable() {
        assert!(UploadError::TransientNetwork("timeout".into()).is_retryable());
        assert!(UploadError::Finalize("502".into()).is_retryable());
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        assert!(UploadError::from(io).is_retryable());
    }

    #[test]
    fn parts_failed_lists_part_numbers() {
        let err = UploadError::PartsFailed(vec![2, 7]);
        assert_eq!(err.to_string(), "Parts failed permanently: [2, 7]");
    }
}
