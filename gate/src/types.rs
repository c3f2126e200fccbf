//! Domain types for the ticket gate.
//!
//! Value objects shared by the scan session, the verification client and the
//! issuing desk.

use crate::error::SessionFault;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Ticket codes
// ============================================================================

/// A one-time ticket code, the identity of a redemption unit
///
/// Codes are opaque. Two codes are equal when their trimmed text is equal;
/// a payload that trims to nothing is not a code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketCode(String);

impl TicketCode {
    /// Parse raw decoded text into a code
    ///
    /// Returns `None` when the text is empty after trimming.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The code text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Status records
// ============================================================================

/// Severity of a status record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// The operation went through
    Success,
    /// The operation was refused or the ticket is spent
    Error,
    /// Something went wrong that may succeed on a retry
    Warning,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
        };
        f.write_str(label)
    }
}

/// What the operator sees after an operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Severity
    pub kind: StatusKind,
    /// Human readable message
    pub message: String,
}

impl StatusRecord {
    /// Build a record
    #[must_use]
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A `success` record
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Success, message)
    }

    /// An `error` record
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Error, message)
    }

    /// A `warning` record
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Warning, message)
    }
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

// ============================================================================
// Verification outcomes
// ============================================================================

/// Classified result of one redemption attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The ticket was valid and is now redeemed
    Accepted(String),
    /// The ticket had already been redeemed
    AlreadyUsed(String),
    /// Network failure, malformed reply or unexpected status
    TransientError(String),
}

impl VerificationOutcome {
    /// The message carried by the outcome
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Accepted(message)
            | Self::AlreadyUsed(message)
            | Self::TransientError(message) => message,
        }
    }

    /// The session fault behind a rejected outcome
    #[must_use]
    pub fn fault(&self) -> Option<SessionFault> {
        match self {
            Self::Accepted(_) => None,
            Self::AlreadyUsed(message) => Some(SessionFault::AlreadyRedeemed(message.clone())),
            Self::TransientError(message) => {
                Some(SessionFault::TransientVerificationFailure(message.clone()))
            },
        }
    }

    /// The status record this outcome publishes
    #[must_use]
    pub fn status_record(&self) -> StatusRecord {
        self.fault().map_or_else(
            || StatusRecord::success(self.message()),
            |fault| fault.status_record(),
        )
    }

    /// Whether the scanner should stop after this outcome
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted(_) | Self::AlreadyUsed(_))
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// Lifecycle phase of the scanner
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScannerPhase {
    /// No camera handle
    #[default]
    Idle,
    /// Camera requested, not yet open
    Starting,
    /// Camera open and decoding frames
    Running,
}

/// Name of the surface a camera is bound to
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountPoint(String);

impl MountPoint {
    /// Create a mount point
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The mount point name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MountPoint {
    fn default() -> Self {
        Self::new("reader")
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one continuous scanning run
///
/// Every start allocates a new run. Camera events carry the run that produced
/// them so events from a stopped run can be told apart from the live one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

impl RunId {
    /// The first run of a session
    #[must_use]
    pub const fn first() -> Self {
        Self(1)
    }

    /// The run after this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw run number
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

// ============================================================================
// Access
// ============================================================================

/// The shared access secret
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Whether `attempt` equals the secret
    #[must_use]
    pub fn matches(&self, attempt: &str) -> bool {
        self.0 == attempt
    }

    /// Whether the secret is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}
