//! Edit clock.
//!
//! Produces strictly increasing millisecond stamps shared by every writer in
//! a session, so two edits can never carry the same `lastEdit`.

use crate::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic wall-clock stamp source.
///
/// When the wall clock stalls or goes backward the clock runs ahead one
/// millisecond per tick instead.
#[derive(Debug, Default)]
pub struct EditClock {
    last_ms: AtomicU64,
}

impl EditClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next stamp, strictly greater than every stamp issued or observed so far.
    pub fn tick(&self) -> Timestamp {
        let now = now_ms();
        let previous = self
            .last_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        Timestamp(now.max(previous.saturating_add(1)))
    }

    /// Ensure the next tick lands after a stamp seen from elsewhere.
    pub fn observe(&self, remote: Timestamp) {
        self.last_ms.fetch_max(remote.millis(), Ordering::SeqCst);
    }

    /// Last stamp issued or observed.
    #[must_use]
    pub fn last(&self) -> Timestamp {
        Timestamp(self.last_ms.load(Ordering::SeqCst))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
