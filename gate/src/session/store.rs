//! View-scoped owner of a scan session store.

use super::actions::ScanAction;
use super::environment::ScanEnvironment;
use super::reducer::ScanSessionReducer;
use super::state::ScanSessionState;
use crate::access::AccessGate;
use crate::dedup::ScanDeduplicator;
use crate::types::{ScannerPhase, StatusRecord};
use std::sync::Arc;
use ticket_gate_runtime::{EffectHandle, Store, StoreError};
use tokio::sync::watch;

/// Store type for the scan session
pub type ScanStore = Store<ScanSessionState, ScanAction, ScanEnvironment, ScanSessionReducer>;

/// One mounted scanner view
///
/// Dropping the session tears the view down: every camera reader it started
/// stops and releases the camera, whether or not the operator stopped
/// scanning. Redemptions already in flight still complete and publish.
pub struct ScanSession {
    store: ScanStore,
    teardown: watch::Sender<bool>,
}

impl ScanSession {
    /// Mount a scanner view
    #[must_use]
    pub fn new(env: ScanEnvironment, access: AccessGate, dedup: ScanDeduplicator) -> Self {
        let (teardown, teardown_rx) = watch::channel(false);
        let state = ScanSessionState::new(access, dedup, teardown_rx);
        let store = Store::new(state, ScanSessionReducer::new(), env);
        Self { store, teardown }
    }

    /// Offer the access secret
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once the view is closed.
    pub async fn submit_secret(&self, secret: impl Into<String>) -> Result<(), StoreError> {
        self.store
            .send(ScanAction::SubmitSecret {
                secret: secret.into(),
            })
            .await
            .map(drop)
    }

    /// Start scanning
    ///
    /// The returned handle tracks the camera reader, which only finishes
    /// when scanning stops; do not wait on it without a timeout. If the
    /// previous run is still releasing the camera, the start is deferred
    /// until it has and the handle tracks nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once the view is closed.
    pub async fn start(&self) -> Result<EffectHandle, StoreError> {
        self.store.send(ScanAction::StartScanning).await
    }

    /// Stop scanning
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once the view is closed.
    pub async fn stop(&self) -> Result<(), StoreError> {
        self.store.send(ScanAction::StopScanning).await.map(drop)
    }

    /// Scanner lifecycle phase
    pub async fn phase(&self) -> ScannerPhase {
        self.store.state(ScanSessionState::phase).await
    }

    /// Read session state via a closure
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&ScanSessionState) -> T,
    {
        self.store.state(f).await
    }

    /// The view-local status slot
    #[must_use]
    pub fn status(&self) -> Option<StatusRecord> {
        self.store.environment().status.local()
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &ScanStore {
        &self.store
    }

    /// The environment the session runs in
    #[must_use]
    pub fn environment(&self) -> &ScanEnvironment {
        self.store.environment()
    }

    /// Status broadcaster shared with the environment
    #[must_use]
    pub fn broadcaster(&self) -> Arc<crate::status::StatusBroadcaster> {
        Arc::clone(&self.store.environment().status)
    }

    /// Tear the view down
    ///
    /// Stops scanning through the reducer, then signals teardown. Equivalent
    /// to dropping the session, except that the state records the teardown.
    pub async fn close(self) {
        if let Err(error) = self.store.send(ScanAction::ViewTornDown).await {
            tracing::debug!(%error, "Teardown action rejected");
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.teardown.send_replace(true);
        tracing::debug!("Scanner view dropped");
    }
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("environment", self.store.environment())
            .finish_non_exhaustive()
    }
}
