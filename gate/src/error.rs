//! Error types for the ticket gate

use crate::types::{MountPoint, StatusRecord};
use thiserror::Error;

/// Fallback message when a verification fails without a usable reason
pub const VERIFY_FALLBACK_MESSAGE: &str = "Error verifying QR code";

/// Errors raised while acquiring or releasing a camera
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    /// Nothing is mounted where the camera should attach
    #[error("No camera surface mounted at '{0}'")]
    MountPointUnavailable(MountPoint),

    /// The device refused to open
    #[error("Camera failed to open: {0}")]
    OpenFailed(String),

    /// The device refused to let go
    #[error("Camera failed to release: {0}")]
    ReleaseFailed(String),
}

/// Errors raised while decoding a single frame
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame held no readable code
    #[error("No QR code in frame")]
    NoCode,

    /// The device failed while reading the frame
    #[error("Frame read failed: {0}")]
    Device(String),
}

/// Transport-level verification failures
///
/// These never leave the verification client: they are classified into a
/// [`VerificationOutcome`](crate::types::VerificationOutcome) first.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// The request never got a response
    #[error("Request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status
    #[error("Verification rejected (status {status})")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// `error` field of the reply body, if any
        error: Option<String>,
        /// `details` field of the reply body, if any
        details: Option<String>,
    },

    /// A success status with a body we could not read
    #[error("Response parsing failed: {0}")]
    MalformedBody(String),
}

/// Errors raised by the issuing desk
#[derive(Debug, Error)]
pub enum IssueError {
    /// The desk has not been unlocked
    #[error("Please verify password first")]
    Locked,

    /// `POST /generate` failed
    #[error("Generate request failed: {0}")]
    Generate(String),

    /// A code image could not be fetched
    #[error("Image download failed for {code}: {reason}")]
    ImageDownload {
        /// Code whose image failed
        code: String,
        /// Why it failed
        reason: String,
    },

    /// Writing the export package failed
    #[error("Package write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl IssueError {
    /// The status record shown for a failed export
    #[must_use]
    pub fn export_status(&self) -> StatusRecord {
        match self {
            Self::Locked => StatusRecord::error("Please verify password first"),
            Self::ImageDownload { code, .. } => {
                StatusRecord::error(format!("Error downloading QR code {code}"))
            },
            Self::Generate(_) | Self::Io(_) => {
                StatusRecord::error("Error creating download package")
            },
        }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Frames per second must lie between one a minute and 1000 a second
    #[error("Scanner FPS must be between 1/60 and 1000, got {0}")]
    InvalidFps(f64),

    /// The access secret may not be empty
    #[error("Access secret must not be empty")]
    EmptySecret,

    /// The verification service URL may not be empty
    #[error("API URL must not be empty")]
    EmptyApiUrl,

    /// An environment variable held something unparseable
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },
}

/// Faults the scan session surfaces to the operator
///
/// None of these are fatal. Each maps to exactly one status record; a
/// suppressed duplicate scan is silent and has no variant here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionFault {
    /// Scanning was requested before the access gate was passed
    #[error("Please verify password first")]
    AccessDenied,

    /// The wrong secret was offered
    #[error("Invalid password")]
    InvalidSecret,

    /// The camera could not be acquired
    #[error("Scanner unavailable: {0}")]
    ScannerUnavailable(String),

    /// The ticket had already been redeemed
    #[error("{0}")]
    AlreadyRedeemed(String),

    /// Verification failed in a way that may succeed on a retry
    #[error("{0}")]
    TransientVerificationFailure(String),
}

impl SessionFault {
    /// The status record this fault publishes
    #[must_use]
    pub fn status_record(&self) -> StatusRecord {
        match self {
            Self::TransientVerificationFailure(message) => StatusRecord::warning(message.clone()),
            other => StatusRecord::error(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusKind;

    #[test]
    fn test_fault_status_records() {
        assert_eq!(
            SessionFault::AccessDenied.status_record(),
            StatusRecord::error("Please verify password first")
        );
        assert_eq!(SessionFault::InvalidSecret.status_record().message, "Invalid password");
        assert_eq!(
            SessionFault::AlreadyRedeemed("Already redeemed at 10:02".into()).status_record(),
            StatusRecord::error("Already redeemed at 10:02")
        );
        assert_eq!(
            SessionFault::TransientVerificationFailure(VERIFY_FALLBACK_MESSAGE.into())
                .status_record()
                .kind,
            StatusKind::Warning
        );
    }

    #[test]
    fn test_export_status_names_failed_code() {
        let error = IssueError::ImageDownload {
            code: "ABC123".into(),
            reason: "404".into(),
        };
        assert_eq!(error.export_status().message, "Error downloading QR code ABC123");

        let io = IssueError::from(std::io::Error::other("disk full"));
        assert_eq!(io.export_status().message, "Error creating download package");
    }

    #[test]
    fn test_camera_error_messages() {
        let error = CameraError::MountPointUnavailable(MountPoint::new("reader"));
        assert_eq!(error.to_string(), "No camera surface mounted at 'reader'");
    }
}
