//! State for the scan session.

use crate::access::AccessGate;
use crate::dedup::ScanDeduplicator;
use crate::types::{RunId, ScannerPhase, TicketCode, VerificationOutcome};
use tokio::sync::watch;

/// Exclusive claim on the camera for one scanning run
///
/// The reader started for the run watches the other end of the lease.
/// Releasing or dropping the lease stops that reader, which then releases
/// the camera itself.
pub struct CameraLease {
    run: RunId,
    stop: watch::Sender<bool>,
}

impl CameraLease {
    pub(super) fn new(run: RunId) -> (Self, watch::Receiver<bool>) {
        let (stop, rx) = watch::channel(false);
        (Self { run, stop }, rx)
    }

    /// The run holding the camera
    #[must_use]
    pub const fn run(&self) -> RunId {
        self.run
    }

    pub(super) fn release(self) {
        let _ = self.stop.send(true);
    }
}

impl std::fmt::Debug for CameraLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraLease").field("run", &self.run).finish_non_exhaustive()
    }
}

/// State of one mounted scanner view
#[derive(Debug)]
pub struct ScanSessionState {
    pub(super) access: AccessGate,
    pub(super) phase: ScannerPhase,
    pub(super) lease: Option<CameraLease>,
    pub(super) releasing: Option<RunId>,
    pub(super) start_pending: bool,
    pub(super) dedup: ScanDeduplicator,
    pub(super) next_run: RunId,
    pub(super) teardown: watch::Receiver<bool>,
    pub(super) torn_down: bool,
    pub(super) in_flight: usize,
    pub(super) submitted: usize,
    pub(super) last_outcome: Option<VerificationOutcome>,
}

impl ScanSessionState {
    /// A locked, idle session
    ///
    /// `teardown` fires when the owning view goes away; every camera reader
    /// the session starts watches it.
    #[must_use]
    pub const fn new(
        access: AccessGate,
        dedup: ScanDeduplicator,
        teardown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            access,
            phase: ScannerPhase::Idle,
            lease: None,
            releasing: None,
            start_pending: false,
            dedup,
            next_run: RunId::first(),
            teardown,
            torn_down: false,
            in_flight: 0,
            submitted: 0,
            last_outcome: None,
        }
    }

    /// Scanner lifecycle phase
    #[must_use]
    pub const fn phase(&self) -> ScannerPhase {
        self.phase
    }

    /// Whether the access gate has been passed
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        self.access.is_unlocked()
    }

    /// Whether a camera lease is held
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.lease.is_some()
    }

    /// Stopped run whose reader may still hold the camera
    #[must_use]
    pub const fn releasing_run(&self) -> Option<RunId> {
        self.releasing
    }

    /// Whether a start is waiting for the previous run to let go
    #[must_use]
    pub const fn is_start_pending(&self) -> bool {
        self.start_pending
    }

    /// Run currently holding the camera
    #[must_use]
    pub fn current_run(&self) -> Option<RunId> {
        self.lease.as_ref().map(CameraLease::run)
    }

    /// Last code submitted in the current run
    #[must_use]
    pub fn last_code(&self) -> Option<&TicketCode> {
        self.dedup.last_code()
    }

    /// Redemptions started but not yet answered
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Redemptions started over the session's lifetime
    #[must_use]
    pub const fn submitted(&self) -> usize {
        self.submitted
    }

    /// The most recent verification outcome
    #[must_use]
    pub const fn last_outcome(&self) -> Option<&VerificationOutcome> {
        self.last_outcome.as_ref()
    }

    /// Whether the owning view has gone away
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Whether `run` holds the camera right now
    pub(super) fn is_current(&self, run: RunId) -> bool {
        self.current_run() == Some(run)
    }

    /// Claim the camera for a fresh run
    pub(super) fn begin_run(&mut self) -> (RunId, watch::Receiver<bool>) {
        let run = self.next_run;
        self.next_run = run.next();

        let (lease, stop) = CameraLease::new(run);
        self.lease = Some(lease);
        self.phase = ScannerPhase::Starting;
        self.dedup.reset();
        (run, stop)
    }

    /// Give up the camera, if held
    ///
    /// The run stays releasing until its reader reports that it has ended.
    /// Returns the run that held it.
    pub(super) fn stop_camera(&mut self) -> Option<RunId> {
        self.phase = ScannerPhase::Idle;
        self.start_pending = false;
        let lease = self.lease.take()?;
        let run = lease.run();
        lease.release();
        self.releasing = Some(run);
        Some(run)
    }

    /// Record that `run`'s reader has ended
    ///
    /// Returns `true` if a deferred start may now go ahead.
    pub(super) fn reader_finished(&mut self, run: RunId) -> bool {
        if self.is_current(run) {
            self.stop_camera();
        }
        if self.releasing != Some(run) {
            return false;
        }
        self.releasing = None;
        std::mem::take(&mut self.start_pending)
    }
}
