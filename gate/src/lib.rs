//! # Ticket Gate
//!
//! Scan a one-time ticket code with a camera and redeem it exactly once.
//!
//! ## Modules
//!
//! - [`session`]: the scan-verify session (camera arbitration, duplicate
//!   suppression, one redemption per code, stop/continue decisions)
//! - [`camera`]: camera reader adapter and the bundled lens camera
//! - [`dedup`]: immediate-repeat suppression
//! - [`verification`]: verification client and outcome classification
//! - [`status`]: view-local and process-wide status slots
//! - [`access`]: shared-secret access gate
//! - [`issuer`]: code generation and package export
//! - [`config`]: environment-driven configuration
//!
//! ## Example
//!
//! ```ignore
//! let status = Arc::new(StatusBroadcaster::new(StatusChannel::new()));
//! let env = ScanEnvironment::new(Arc::new(camera), Arc::new(verifier), status);
//! let access = AccessGate::new(Secret::from("0000"));
//! let session = ScanSession::new(env, access, ScanDeduplicator::new());
//!
//! session.submit_secret("0000").await?;
//! session.start().await?;
//! ```

pub mod access;
pub mod camera;
pub mod config;
pub mod dedup;
pub mod error;
pub mod issuer;
pub mod session;
pub mod status;
pub mod types;
pub mod verification;

pub use access::{AccessGate, AccessGrant};
pub use camera::{CameraDevice, CameraEvent, CameraReader, FrameDecoder, LensCamera};
pub use config::Config;
pub use dedup::ScanDeduplicator;
pub use error::{CameraError, ConfigError, DecodeError, IssueError, SessionFault, VerifyError};
pub use session::{ScanAction, ScanEnvironment, ScanSession, ScanSessionReducer, ScanSessionState};
pub use status::{StatusBroadcaster, StatusChannel};
pub use types::{
    MountPoint, RunId, ScannerPhase, Secret, StatusKind, StatusRecord, TicketCode,
    VerificationOutcome,
};
pub use verification::{HttpVerificationClient, ScriptedVerifier, TicketVerifier};
