//! Status publication.
//!
//! Every outcome lands in two last-write-wins slots: one local to the screen
//! that produced it, and one process-wide [`StatusChannel`] that any screen
//! can read. Records are overwritten, never merged or queued.

use crate::types::StatusRecord;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Process-wide status slot
///
/// Cheap to clone; all clones share the same slot. Subscribers see the
/// latest record only.
#[derive(Clone, Debug)]
pub struct StatusChannel {
    slot: Arc<watch::Sender<Option<StatusRecord>>>,
}

impl StatusChannel {
    /// An empty slot
    #[must_use]
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Overwrite the slot
    pub fn publish(&self, record: StatusRecord) {
        self.slot.send_replace(Some(record));
    }

    /// Empty the slot
    pub fn clear(&self) {
        self.slot.send_replace(None);
    }

    /// The latest record
    ///
    /// A broadcaster may be midway through a publish; read through
    /// [`StatusBroadcaster::snapshot`] to see both slots agree.
    #[must_use]
    pub fn current(&self) -> Option<StatusRecord> {
        self.slot.borrow().clone()
    }

    /// Watch the slot for changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<StatusRecord>> {
        self.slot.subscribe()
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes to a screen's local slot and the process-wide slot together
///
/// A reader going through [`StatusBroadcaster::snapshot`] never sees one slot
/// updated without the other.
#[derive(Debug)]
pub struct StatusBroadcaster {
    local: watch::Sender<Option<StatusRecord>>,
    shared: StatusChannel,
    write: Mutex<()>,
}

impl StatusBroadcaster {
    /// A broadcaster with an empty local slot feeding `shared`
    #[must_use]
    pub fn new(shared: StatusChannel) -> Self {
        let (local, _) = watch::channel(None);
        Self {
            local,
            shared,
            write: Mutex::new(()),
        }
    }

    /// Overwrite both slots with `record`
    pub fn publish(&self, record: StatusRecord) {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(kind = %record.kind, message = %record.message, "Status published");
        metrics::counter!("status.published", "kind" => record.kind.to_string()).increment(1);
        self.local.send_replace(Some(record.clone()));
        self.shared.publish(record);
    }

    /// The local slot
    ///
    /// Never returns a record whose publish to the shared slot is still
    /// under way.
    #[must_use]
    pub fn local(&self) -> Option<StatusRecord> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        self.local.borrow().clone()
    }

    /// Both slots, read consistently
    #[must_use]
    pub fn snapshot(&self) -> (Option<StatusRecord>, Option<StatusRecord>) {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        (self.local.borrow().clone(), self.shared.current())
    }

    /// Watch the local slot for changes
    #[must_use]
    pub fn subscribe_local(&self) -> watch::Receiver<Option<StatusRecord>> {
        self.local.subscribe()
    }

    /// The process-wide slot this broadcaster feeds
    #[must_use]
    pub const fn shared(&self) -> &StatusChannel {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_writes_both_slots() {
        let shared = StatusChannel::new();
        let broadcaster = StatusBroadcaster::new(shared.clone());

        broadcaster.publish(StatusRecord::success("Welcome, ABC123"));

        let (local, global) = broadcaster.snapshot();
        assert_eq!(local, Some(StatusRecord::success("Welcome, ABC123")));
        assert_eq!(local, global);
        assert_eq!(shared.current(), local);
    }

    #[test]
    fn test_last_write_wins() {
        let broadcaster = StatusBroadcaster::new(StatusChannel::new());

        broadcaster.publish(StatusRecord::warning("Error verifying QR code"));
        broadcaster.publish(StatusRecord::error("Invalid password"));

        assert_eq!(broadcaster.local(), Some(StatusRecord::error("Invalid password")));
    }

    #[test]
    fn test_screens_share_the_process_wide_slot() {
        let shared = StatusChannel::new();
        let scanner = StatusBroadcaster::new(shared.clone());
        let issuer = StatusBroadcaster::new(shared.clone());

        scanner.publish(StatusRecord::success("Welcome"));
        issuer.publish(StatusRecord::success("New QR code generated successfully!"));

        assert_eq!(scanner.local(), Some(StatusRecord::success("Welcome")));
        assert_eq!(
            shared.current(),
            Some(StatusRecord::success("New QR code generated successfully!"))
        );
    }

    #[test]
    fn test_local_read_never_runs_ahead_of_shared_slot() {
        fn index(record: Option<StatusRecord>) -> usize {
            record.map_or(0, |r| r.message.parse().unwrap_or(0))
        }

        let broadcaster = Arc::new(StatusBroadcaster::new(StatusChannel::new()));
        let writer = {
            let broadcaster = Arc::clone(&broadcaster);
            std::thread::spawn(move || {
                for i in 1..=5_000 {
                    broadcaster.publish(StatusRecord::success(i.to_string()));
                }
            })
        };

        while !writer.is_finished() {
            let local = index(broadcaster.local());
            let shared = index(broadcaster.shared().current());
            assert!(shared >= local, "shared slot {shared} behind local slot {local}");
        }
        assert!(writer.join().is_ok());

        let (local, shared) = broadcaster.snapshot();
        assert_eq!(local, shared);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_record() {
        let shared = StatusChannel::new();
        let mut rx = shared.subscribe();

        shared.publish(StatusRecord::success("first"));
        shared.publish(StatusRecord::success("second"));

        assert!(rx.changed().await.is_ok());
        assert_eq!(rx.borrow_and_update().clone(), Some(StatusRecord::success("second")));

        shared.clear();
        assert_eq!(shared.current(), None);
    }
}
