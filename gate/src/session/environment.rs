//! Injected dependencies for the scan session.

use crate::camera::{CameraDevice, CameraReader, clamp_frame_interval};
use crate::status::StatusBroadcaster;
use crate::types::MountPoint;
use crate::verification::TicketVerifier;
use std::sync::Arc;
use std::time::Duration;
use ticket_gate_core::environment::{Clock, SystemClock};

/// Everything the scan session reducer needs from the outside world
#[derive(Clone)]
pub struct ScanEnvironment {
    /// Camera the reader opens
    pub camera: Arc<dyn CameraDevice>,
    /// Ledger the codes are redeemed against
    pub verifier: Arc<dyn TicketVerifier>,
    /// Where status records go
    pub status: Arc<StatusBroadcaster>,
    /// Time source for duplicate windows
    pub clock: Arc<dyn Clock>,
    /// Surface the camera binds to
    pub mount_point: MountPoint,
    /// Time between decoded frames
    pub frame_interval: Duration,
}

impl ScanEnvironment {
    /// An environment on the system clock, mount point `reader`, one frame a second
    #[must_use]
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        verifier: Arc<dyn TicketVerifier>,
        status: Arc<StatusBroadcaster>,
    ) -> Self {
        Self {
            camera,
            verifier,
            status,
            clock: Arc::new(SystemClock),
            mount_point: MountPoint::default(),
            frame_interval: Duration::from_secs(1),
        }
    }

    /// Use `clock` instead of the system clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bind the camera to `mount_point`
    #[must_use]
    pub fn with_mount_point(mut self, mount_point: MountPoint) -> Self {
        self.mount_point = mount_point;
        self
    }

    /// Read one frame per `frame_interval`, clamped to what a reader can tick at
    #[must_use]
    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = clamp_frame_interval(frame_interval);
        self
    }

    /// A reader over this environment's camera
    #[must_use]
    pub fn reader(&self) -> CameraReader {
        CameraReader::new(
            Arc::clone(&self.camera),
            self.mount_point.clone(),
            self.frame_interval,
        )
    }
}

impl std::fmt::Debug for ScanEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanEnvironment")
            .field("mount_point", &self.mount_point)
            .field("frame_interval", &self.frame_interval)
            .finish_non_exhaustive()
    }
}
