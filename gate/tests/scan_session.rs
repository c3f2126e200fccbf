//! End-to-end scan session tests on the store runtime.
//!
//! The lens camera stands in for real hardware and a scripted verifier for
//! the ledger. Time is paused, so frame cadence and verification latency are
//! exact.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use ticket_gate::{
    AccessGate, CameraDevice, CameraError, DecodeError, FrameDecoder, LensCamera, MountPoint,
    ScanDeduplicator, ScanEnvironment, ScanSession, ScannerPhase, ScriptedVerifier, Secret,
    StatusBroadcaster, StatusChannel, StatusRecord, TicketCode, VerificationOutcome,
};

const FRAME: Duration = Duration::from_millis(100);

struct Gate {
    session: ScanSession,
    camera: LensCamera,
    verifier: ScriptedVerifier,
    shared: StatusChannel,
    mount_point: MountPoint,
}

fn mount(verifier: ScriptedVerifier) -> Gate {
    mount_at(verifier, MountPoint::default())
}

fn mount_at(verifier: ScriptedVerifier, bind_to: MountPoint) -> Gate {
    let mount_point = MountPoint::default();
    let camera = LensCamera::with_mount_point(mount_point.clone());
    let shared = StatusChannel::new();

    let env = ScanEnvironment::new(
        Arc::new(camera.clone()),
        Arc::new(verifier.clone()),
        Arc::new(StatusBroadcaster::new(shared.clone())),
    )
    .with_mount_point(bind_to)
    .with_frame_interval(FRAME);

    let session = ScanSession::new(
        env,
        AccessGate::new(Secret::from("0000")),
        ScanDeduplicator::new(),
    );

    Gate {
        session,
        camera,
        verifier,
        shared,
        mount_point,
    }
}

impl Gate {
    async fn unlock_and_start(&self) {
        self.session.submit_secret("0000").await.unwrap();
        self.session.start().await.unwrap();
    }

    fn show(&self, payload: &str) {
        self.camera.present(&self.mount_point, payload);
    }

    fn calls(&self) -> Vec<String> {
        self.verifier
            .calls()
            .iter()
            .map(|code| code.as_str().to_string())
            .collect()
    }
}

fn transient() -> VerificationOutcome {
    VerificationOutcome::TransientError("Error verifying QR code".into())
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_accepted_ticket_stops_scanner() {
    let gate = mount(ScriptedVerifier::new().respond(
        "ABC123",
        VerificationOutcome::Accepted("Welcome, ABC123".into()),
    ));
    gate.show("ABC123");

    gate.unlock_and_start().await;
    settle().await;

    assert_eq!(gate.calls(), vec!["ABC123"]);
    assert_eq!(gate.session.phase().await, ScannerPhase::Idle);
    assert_eq!(gate.session.status(), Some(StatusRecord::success("Welcome, ABC123")));
    assert_eq!(gate.shared.current(), gate.session.status());
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 0);
}

#[tokio::test(start_paused = true)]
async fn test_already_used_ticket_stops_scanner() {
    let gate = mount(ScriptedVerifier::new().respond(
        "ABC123",
        VerificationOutcome::AlreadyUsed("Already redeemed at 10:02".into()),
    ));
    gate.show("ABC123");

    gate.unlock_and_start().await;
    settle().await;

    assert_eq!(gate.session.phase().await, ScannerPhase::Idle);
    assert_eq!(
        gate.session.status(),
        Some(StatusRecord::error("Already redeemed at 10:02"))
    );
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_keeps_camera_live() {
    let gate = mount(ScriptedVerifier::new().otherwise(transient()));
    gate.show("ABC123");

    gate.unlock_and_start().await;
    settle().await;

    assert_eq!(gate.session.phase().await, ScannerPhase::Running);
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 1);
    assert_eq!(
        gate.session.status(),
        Some(StatusRecord::warning("Error verifying QR code"))
    );
    // Still held up, still suppressed.
    assert_eq!(gate.calls(), vec!["ABC123"]);

    gate.session.stop().await.unwrap();
    settle().await;
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 0);
}

#[tokio::test(start_paused = true)]
async fn test_held_code_is_submitted_once() {
    let gate = mount(ScriptedVerifier::new().otherwise(transient()));
    gate.show("A");

    gate.unlock_and_start().await;
    tokio::time::sleep(FRAME * 20).await;

    assert!(gate.camera.frames_read(&gate.mount_point) >= 20);
    assert_eq!(gate.calls(), vec!["A"]);
}

#[tokio::test(start_paused = true)]
async fn test_alternating_codes_are_each_submitted() {
    let gate = mount(ScriptedVerifier::new().otherwise(transient()));

    gate.unlock_and_start().await;
    for code in ["A", "B", "A"] {
        gate.show(code);
        tokio::time::sleep(FRAME * 3).await;
    }

    assert_eq!(gate.calls(), vec!["A", "B", "A"]);
}

#[tokio::test(start_paused = true)]
async fn test_blank_frames_between_repeats_do_not_resubmit() {
    let gate = mount(ScriptedVerifier::new().otherwise(transient()));

    gate.unlock_and_start().await;
    gate.show("A");
    tokio::time::sleep(FRAME * 3).await;
    gate.show("   ");
    tokio::time::sleep(FRAME * 3).await;
    gate.show("A");
    tokio::time::sleep(FRAME * 3).await;

    assert_eq!(gate.calls(), vec!["A"]);
}

#[tokio::test(start_paused = true)]
async fn test_double_start_holds_one_camera() {
    let gate = mount(ScriptedVerifier::new());

    gate.unlock_and_start().await;
    gate.session.start().await.unwrap();
    settle().await;

    assert_eq!(gate.camera.live_handles(&gate.mount_point), 1);
    assert_eq!(gate.camera.opened_count(&gate.mount_point), 1);
    assert_eq!(gate.session.phase().await, ScannerPhase::Running);
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_start_opens_a_fresh_run() {
    let gate = mount(ScriptedVerifier::new().otherwise(transient()));
    gate.show("A");

    gate.unlock_and_start().await;
    settle().await;
    gate.session.stop().await.unwrap();
    settle().await;
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 0);

    gate.session.start().await.unwrap();
    settle().await;

    // A new run forgets the last code.
    assert_eq!(gate.calls(), vec!["A", "A"]);
    assert_eq!(gate.camera.opened_count(&gate.mount_point), 2);
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_secret_never_opens_camera() {
    let gate = mount(ScriptedVerifier::new());
    gate.show("ABC123");

    gate.session.submit_secret("9999").await.unwrap();
    assert_eq!(gate.session.status(), Some(StatusRecord::error("Invalid password")));

    gate.session.start().await.unwrap();
    settle().await;

    assert_eq!(gate.camera.opened_count(&gate.mount_point), 0);
    assert_eq!(gate.session.phase().await, ScannerPhase::Idle);
    assert_eq!(
        gate.session.status(),
        Some(StatusRecord::error("Please verify password first"))
    );
    assert!(gate.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_mount_point_aborts_start() {
    let gate = mount_at(ScriptedVerifier::new(), MountPoint::new("elsewhere"));

    gate.unlock_and_start().await;
    settle().await;

    assert_eq!(gate.session.phase().await, ScannerPhase::Idle);
    assert!(!gate.session.state(|s| s.is_active()).await);
    assert_eq!(
        gate.session.status(),
        Some(StatusRecord::error(
            "Scanner unavailable: No camera surface mounted at 'elsewhere'"
        ))
    );

    // Nothing half-initialised is left behind: a later start tries again.
    gate.session.start().await.unwrap();
    settle().await;
    assert_eq!(gate.session.phase().await, ScannerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_verification_publishes_after_stop() {
    let verifier = ScriptedVerifier::new()
        .with_latency(Duration::from_millis(500))
        .respond("ABC123", VerificationOutcome::Accepted("Welcome, ABC123".into()));
    let gate = mount(verifier);
    gate.show("ABC123");

    gate.unlock_and_start().await;
    tokio::time::sleep(FRAME + FRAME / 2).await;
    gate.session.stop().await.unwrap();
    assert_eq!(
        gate.session.status(),
        Some(StatusRecord::success("Password verified successfully!"))
    );

    settle().await;
    assert_eq!(gate.session.status(), Some(StatusRecord::success("Welcome, ABC123")));
    assert_eq!(gate.session.phase().await, ScannerPhase::Idle);
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_view_releases_camera() {
    let gate = mount(ScriptedVerifier::new().otherwise(transient()));
    gate.show("ABC123");

    gate.unlock_and_start().await;
    settle().await;
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 1);

    let Gate {
        session,
        camera,
        mount_point,
        ..
    } = gate;
    drop(session);
    settle().await;

    assert_eq!(camera.live_handles(&mount_point), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_records_teardown_and_blocks_restart() {
    let gate = mount(ScriptedVerifier::new().otherwise(transient()));

    gate.unlock_and_start().await;
    settle().await;

    let store = gate.session.store().clone();
    gate.session.close().await;
    settle().await;

    assert!(store.state(|s| s.is_torn_down()).await);
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 0);

    store.send(ticket_gate::ScanAction::StartScanning).await.unwrap();
    settle().await;
    assert_eq!(gate.camera.opened_count(&gate.mount_point), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_window_resubmits_a_held_code() {
    let mount_point = MountPoint::default();
    let camera = LensCamera::with_mount_point(mount_point.clone());
    let verifier = ScriptedVerifier::new().otherwise(transient());
    let clock = ticket_gate_testing::manual_clock();

    let env = ScanEnvironment::new(
        Arc::new(camera.clone()),
        Arc::new(verifier.clone()),
        Arc::new(StatusBroadcaster::new(StatusChannel::new())),
    )
    .with_clock(Arc::new(clock.clone()))
    .with_frame_interval(FRAME);
    let session = ScanSession::new(
        env,
        AccessGate::new(Secret::from("0000")),
        ScanDeduplicator::with_window(Duration::from_secs(5)),
    );

    camera.present(&mount_point, "ABC123");
    session.submit_secret("0000").await.unwrap();
    session.start().await.unwrap();
    settle().await;
    assert_eq!(verifier.call_count(), 1);

    clock.advance(chrono::Duration::seconds(5));
    settle().await;

    assert_eq!(
        verifier.calls(),
        vec![TicketCode::parse("ABC123").unwrap(); 2]
    );
}

#[tokio::test(start_paused = true)]
async fn test_zero_frame_interval_keeps_session_usable() {
    let mount_point = MountPoint::default();
    let camera = LensCamera::with_mount_point(mount_point.clone());
    let env = ScanEnvironment::new(
        Arc::new(camera.clone()),
        Arc::new(ScriptedVerifier::new()),
        Arc::new(StatusBroadcaster::new(StatusChannel::new())),
    )
    .with_frame_interval(Duration::ZERO);
    let session = ScanSession::new(
        env,
        AccessGate::new(Secret::from("0000")),
        ScanDeduplicator::new(),
    );

    session.submit_secret("0000").await.unwrap();
    session.start().await.unwrap();
    settle().await;
    assert_eq!(session.phase().await, ScannerPhase::Running);
    assert_eq!(camera.live_handles(&mount_point), 1);

    session.stop().await.unwrap();
    settle().await;
    session.start().await.unwrap();
    settle().await;

    assert_eq!(camera.opened_count(&mount_point), 2);
    assert_eq!(camera.live_handles(&mount_point), 1);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_restart_waits_for_the_camera() {
    let gate = mount(ScriptedVerifier::new().otherwise(transient()));

    gate.unlock_and_start().await;
    settle().await;

    gate.session.stop().await.unwrap();
    gate.session.start().await.unwrap();
    settle().await;

    assert_eq!(gate.camera.opened_count(&gate.mount_point), 2);
    assert_eq!(gate.camera.live_handles(&gate.mount_point), 1);
    assert_eq!(gate.session.phase().await, ScannerPhase::Running);
}

/// Camera that records the most handles ever open at once
#[derive(Clone, Default)]
struct CountingCamera {
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

struct CountingDecoder {
    live: Arc<AtomicUsize>,
    released: bool,
}

impl CameraDevice for CountingCamera {
    fn open(&self, _mount_point: &MountPoint) -> Result<Box<dyn FrameDecoder>, CameraError> {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(CountingDecoder {
            live: Arc::clone(&self.live),
            released: false,
        }))
    }
}

impl FrameDecoder for CountingDecoder {
    fn decode_frame(&mut self) -> Result<String, DecodeError> {
        Err(DecodeError::NoCode)
    }

    fn release(&mut self) -> Result<(), CameraError> {
        if !self.released {
            self.released = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_restarts_never_hold_two_cameras() {
    let camera = CountingCamera::default();
    let env = ScanEnvironment::new(
        Arc::new(camera.clone()),
        Arc::new(ScriptedVerifier::new()),
        Arc::new(StatusBroadcaster::new(StatusChannel::new())),
    )
    .with_frame_interval(Duration::from_millis(1));
    let session = ScanSession::new(
        env,
        AccessGate::new(Secret::from("0000")),
        ScanDeduplicator::new(),
    );
    session.submit_secret("0000").await.unwrap();

    for _ in 0..1_000 {
        session.start().await.unwrap();
        tokio::task::yield_now().await;
        session.stop().await.unwrap();
        session.start().await.unwrap();
        session.stop().await.unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let settled = session
            .state(|s| !s.is_active() && s.releasing_run().is_none())
            .await;
        if settled && camera.live.load(Ordering::SeqCst) == 0 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "readers did not wind down");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(camera.peak.load(Ordering::SeqCst) <= 1);
}
