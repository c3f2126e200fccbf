//! Actions for the scan session.

use crate::camera::CameraEvent;
use crate::types::{RunId, TicketCode, VerificationOutcome};

/// Everything the scan session reacts to
///
/// Operator commands come from the view; camera events and verification
/// results are fed back by effects. Camera-derived actions carry the run that
/// produced them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanAction {
    // Commands
    /// Offer the access secret
    SubmitSecret {
        /// The secret as typed
        secret: String,
    },

    /// Start the scanner
    StartScanning,

    /// Stop the scanner
    StopScanning,

    /// The owning view is going away
    ViewTornDown,

    // Camera events
    /// The camera opened
    CameraOpened {
        /// Run that opened it
        run: RunId,
    },

    /// The camera could not be opened
    CameraUnavailable {
        /// Run that tried
        run: RunId,
        /// Why it failed
        reason: String,
    },

    /// A frame decoded to some text
    CodeDecoded {
        /// Run that decoded it
        run: RunId,
        /// Raw decoded text
        text: String,
    },

    /// A frame held nothing readable
    DecodeFailed {
        /// Run that read it
        run: RunId,
        /// Decoder's reason
        reason: String,
    },

    /// The camera was released
    CameraClosed {
        /// Run that released it
        run: RunId,
    },

    /// The run's reader has ended and holds no camera handle
    ///
    /// Follows the reader's last event on every exit path, including a stop
    /// that arrived before the camera was opened.
    ReaderFinished {
        /// Run whose reader ended
        run: RunId,
    },

    // Verification
    /// A redemption finished
    VerificationCompleted {
        /// Run that submitted the code
        run: RunId,
        /// The code submitted
        code: TicketCode,
        /// Classified result
        outcome: VerificationOutcome,
    },
}

impl ScanAction {
    /// Tag a camera event with the run that produced it
    #[must_use]
    pub fn from_camera(run: RunId, event: CameraEvent) -> Self {
        match event {
            CameraEvent::Opened => Self::CameraOpened { run },
            CameraEvent::Decoded(text) => Self::CodeDecoded { run, text },
            CameraEvent::DecodeFailed(error) => Self::DecodeFailed {
                run,
                reason: error.to_string(),
            },
            CameraEvent::Unavailable(error) => Self::CameraUnavailable {
                run,
                reason: error.to_string(),
            },
            CameraEvent::Closed => Self::CameraClosed { run },
        }
    }

    /// The run a camera or verification action belongs to
    #[must_use]
    pub const fn run(&self) -> Option<RunId> {
        match self {
            Self::CameraOpened { run }
            | Self::CameraUnavailable { run, .. }
            | Self::CodeDecoded { run, .. }
            | Self::DecodeFailed { run, .. }
            | Self::CameraClosed { run }
            | Self::ReaderFinished { run }
            | Self::VerificationCompleted { run, .. } => Some(*run),
            Self::SubmitSecret { .. }
            | Self::StartScanning
            | Self::StopScanning
            | Self::ViewTornDown => None,
        }
    }
}
