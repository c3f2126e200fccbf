//! Shared-secret access gate.
//!
//! A static comparison against one configured secret. There is no lockout and
//! no rate limiting; a wrong attempt never revokes an earlier grant.

use crate::error::SessionFault;
use crate::types::{Secret, StatusRecord};

/// Result of one unlock attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessGrant {
    /// The secret matched
    Granted,
    /// The secret did not match
    Denied,
}

impl AccessGrant {
    /// Whether access was granted
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    /// The status record this attempt publishes
    #[must_use]
    pub fn status_record(self) -> StatusRecord {
        match self {
            Self::Granted => StatusRecord::success("Password verified successfully!"),
            Self::Denied => SessionFault::InvalidSecret.status_record(),
        }
    }
}

/// Gate that must be passed before scanning or issuing
#[derive(Debug, Clone)]
pub struct AccessGate {
    secret: Secret,
    unlocked: bool,
}

impl AccessGate {
    /// Create a locked gate for `secret`
    #[must_use]
    pub const fn new(secret: Secret) -> Self {
        Self {
            secret,
            unlocked: false,
        }
    }

    /// Try to unlock the gate
    pub fn verify(&mut self, attempt: &str) -> AccessGrant {
        if self.secret.matches(attempt) {
            self.unlocked = true;
            tracing::info!("Access granted");
            metrics::counter!("access.attempts", "result" => "granted").increment(1);
            AccessGrant::Granted
        } else {
            tracing::warn!(unlocked = self.unlocked, "Access denied");
            metrics::counter!("access.attempts", "result" => "denied").increment(1);
            AccessGrant::Denied
        }
    }

    /// Whether the gate has been passed
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Fail with [`SessionFault::AccessDenied`] unless unlocked
    ///
    /// # Errors
    ///
    /// Returns [`SessionFault::AccessDenied`] if the gate is still locked.
    pub const fn require_unlocked(&self) -> Result<(), SessionFault> {
        if self.unlocked {
            Ok(())
        } else {
            Err(SessionFault::AccessDenied)
        }
    }
}
