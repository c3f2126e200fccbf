//! Immediate-repeat suppression for decoded frames.
//!
//! The camera decodes the same code on every frame for as long as it is held
//! up. The deduplicator turns that noise into one notification per code
//! presented. It remembers only the last handled code, not a history.

use crate::types::TicketCode;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Suppresses a code that equals the last one handled
#[derive(Debug, Clone, Default)]
pub struct ScanDeduplicator {
    last: Option<(TicketCode, DateTime<Utc>)>,
    window: Option<Duration>,
}

impl ScanDeduplicator {
    /// Purely equality based suppression
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: None,
            window: None,
        }
    }

    /// Suppress repeats only while they arrive within `window` of the last
    /// handled code
    ///
    /// The window runs from when the code was passed through, not from the
    /// latest suppressed repeat, so a code held up continuously is resubmitted
    /// once per window.
    #[must_use]
    pub const fn with_window(window: Duration) -> Self {
        Self {
            last: None,
            window: Some(window),
        }
    }

    /// Filter one decoded payload
    ///
    /// Returns the code when it should be submitted. The last code is updated
    /// before returning, so a repeat arriving while the submission is still in
    /// flight is suppressed. Blank payloads are ignored and leave the memory
    /// untouched.
    pub fn on_decoded(&mut self, raw: &str, now: DateTime<Utc>) -> Option<TicketCode> {
        let code = TicketCode::parse(raw)?;

        if let Some((last, handled_at)) = &self.last {
            if *last == code && self.within_window(*handled_at, now) {
                tracing::debug!(code = %code, "Duplicate scan suppressed");
                metrics::counter!("scanner.duplicates_suppressed").increment(1);
                return None;
            }
        }

        self.last = Some((code.clone(), now));
        Some(code)
    }

    /// Forget the last code
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// The last code passed through
    #[must_use]
    pub fn last_code(&self) -> Option<&TicketCode> {
        self.last.as_ref().map(|(code, _)| code)
    }

    fn within_window(&self, handled_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let Some(window) = self.window else {
            return true;
        };
        // A clock running backwards counts as inside the window.
        (now - handled_at)
            .to_std()
            .map_or(true, |elapsed| elapsed < window)
    }
}
