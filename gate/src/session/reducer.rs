//! Reducer for the scan session.
//!
//! Owns every scanning decision: whether the camera may start, which decoded
//! frames become redemptions, and whether an outcome ends the run. Camera
//! reads run as a stream effect and redemptions as future effects; both feed
//! their results back as actions.
//!
//! Status records are published while reducing, so they reach both slots in
//! the order the outcomes were reduced.

use super::actions::ScanAction;
use super::environment::ScanEnvironment;
use super::state::ScanSessionState;
use crate::error::SessionFault;
use crate::types::{RunId, ScannerPhase, TicketCode};
use futures::StreamExt;
use ticket_gate_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};

/// Reducer for [`ScanSessionState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSessionReducer;

impl ScanSessionReducer {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn start(state: &mut ScanSessionState, env: &ScanEnvironment) -> Effect<ScanAction> {
        if state.torn_down {
            tracing::debug!("Start ignored: view torn down");
            return Effect::None;
        }

        if let Err(fault) = state.access.require_unlocked() {
            tracing::warn!("Start refused: access not granted");
            env.status.publish(fault.status_record());
            return Effect::None;
        }

        if let Some(run) = state.current_run() {
            tracing::debug!(%run, "Start ignored: camera already claimed");
            return Effect::None;
        }

        if let Some(run) = state.releasing {
            tracing::debug!(%run, "Start deferred until the previous run lets go of the camera");
            state.start_pending = true;
            state.phase = ScannerPhase::Starting;
            return Effect::None;
        }

        Self::begin_run(state, env)
    }

    fn begin_run(state: &mut ScanSessionState, env: &ScanEnvironment) -> Effect<ScanAction> {
        let (run, stop) = state.begin_run();
        tracing::info!(%run, mount_point = %env.mount_point, "Scanner starting");
        metrics::counter!("scanner.runs.started").increment(1);

        let events = env
            .reader()
            .events(stop, state.teardown.clone())
            .map(move |event| ScanAction::from_camera(run, event))
            .chain(futures::stream::once(async move {
                ScanAction::ReaderFinished { run }
            }));
        Effect::stream(events)
    }

    fn decoded(
        state: &mut ScanSessionState,
        run: RunId,
        text: &str,
        env: &ScanEnvironment,
    ) -> Effect<ScanAction> {
        if !state.is_current(run) || state.phase != ScannerPhase::Running {
            tracing::trace!(%run, "Frame from inactive run ignored");
            return Effect::None;
        }

        let Some(code) = state.dedup.on_decoded(text, env.clock.now()) else {
            return Effect::None;
        };

        state.in_flight += 1;
        state.submitted += 1;
        tracing::info!(%run, code = %code, "Submitting code for verification");
        metrics::counter!("scanner.codes.submitted").increment(1);

        Self::redeem(run, code, env)
    }

    fn redeem(run: RunId, code: TicketCode, env: &ScanEnvironment) -> Effect<ScanAction> {
        let verifier = std::sync::Arc::clone(&env.verifier);
        Effect::future(async move {
            let outcome = verifier.redeem(code.clone()).await;
            Some(ScanAction::VerificationCompleted { run, code, outcome })
        })
    }
}

impl Reducer for ScanSessionReducer {
    type State = ScanSessionState;
    type Action = ScanAction;
    type Environment = ScanEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ScanAction::SubmitSecret { secret } => {
                let grant = state.access.verify(&secret);
                env.status.publish(grant.status_record());
                smallvec![Effect::None]
            },

            ScanAction::StartScanning => smallvec![Self::start(state, env)],

            ScanAction::StopScanning => {
                if let Some(run) = state.stop_camera() {
                    tracing::info!(%run, "Scanner stopped");
                    metrics::counter!("scanner.runs.stopped", "reason" => "operator")
                        .increment(1);
                }
                smallvec![Effect::None]
            },

            ScanAction::ViewTornDown => {
                state.torn_down = true;
                if let Some(run) = state.stop_camera() {
                    tracing::info!(%run, "Scanner stopped on teardown");
                    metrics::counter!("scanner.runs.stopped", "reason" => "teardown")
                        .increment(1);
                }
                smallvec![Effect::None]
            },

            ScanAction::CameraOpened { run } => {
                if state.is_current(run) {
                    state.phase = ScannerPhase::Running;
                    tracing::info!(%run, "Scanner running");
                } else {
                    tracing::debug!(%run, "Camera opened for a stale run");
                }
                smallvec![Effect::None]
            },

            ScanAction::CameraUnavailable { run, reason } => {
                if state.is_current(run) {
                    state.stop_camera();
                    tracing::warn!(%run, %reason, "Scanner could not start");
                    env.status
                        .publish(SessionFault::ScannerUnavailable(reason).status_record());
                }
                smallvec![Effect::None]
            },

            ScanAction::CodeDecoded { run, text } => {
                smallvec![Self::decoded(state, run, &text, env)]
            },

            ScanAction::DecodeFailed { run, reason } => {
                tracing::trace!(%run, %reason, "Frame not decoded");
                smallvec![Effect::None]
            },

            ScanAction::CameraClosed { run } => {
                if state.is_current(run) {
                    state.stop_camera();
                    tracing::warn!(%run, "Camera closed while the run was live");
                } else {
                    tracing::debug!(%run, "Camera closed");
                }
                smallvec![Effect::None]
            },

            ScanAction::ReaderFinished { run } => {
                tracing::debug!(%run, "Camera reader finished");
                if state.reader_finished(run) && !state.torn_down {
                    tracing::info!(%run, "Starting deferred run");
                    return smallvec![Self::begin_run(state, env)];
                }
                smallvec![Effect::None]
            },

            ScanAction::VerificationCompleted { run, code, outcome } => {
                state.in_flight = state.in_flight.saturating_sub(1);
                tracing::info!(%run, code = %code, outcome = ?outcome, "Verification completed");
                env.status.publish(outcome.status_record());

                if outcome.is_terminal() && state.is_current(run) {
                    state.stop_camera();
                    tracing::info!(%run, "Scanner stopped after final outcome");
                    metrics::counter!("scanner.runs.stopped", "reason" => "outcome")
                        .increment(1);
                }

                state.last_outcome = Some(outcome);
                smallvec![Effect::None]
            },
        }
    }
}
