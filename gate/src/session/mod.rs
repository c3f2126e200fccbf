//! The scan-verify session.
//!
//! A reducer over [`ScanSessionState`] arbitrates the camera, filters decoded
//! frames into distinct codes, redeems each code once and turns outcomes into
//! status records and stop decisions. [`ScanSession`] owns the store for one
//! mounted view.

mod actions;
mod environment;
mod reducer;
mod state;
mod store;


pub use actions::ScanAction;
pub use environment::ScanEnvironment;
pub use reducer::ScanSessionReducer;
pub use state::{CameraLease, ScanSessionState};
pub use store::{ScanSession, ScanStore};
