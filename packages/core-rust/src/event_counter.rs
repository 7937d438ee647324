//! Success/failure event counting for call outcomes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of counted events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCount {
    pub success: u64,
    pub failure: u64,
}

impl EventCount {
    #[must_use]
    pub fn new(success: u64, failure: u64) -> Self {
        Self { success, failure }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }

    /// Fraction of successful events, or `None` when nothing was counted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.success as f64 / total as f64)
    }

    /// Fraction of failed events, or `None` when nothing was counted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.failure as f64 / total as f64)
    }
}

/// Sink for call outcomes.
///
/// Windowed implementations may return `None` from `on_success`/`on_failure`
/// when the event did not change the published count.
pub trait EventCounter: Send + Sync {
    /// Returns the current count.
    fn count(&self) -> EventCount;

    /// Counts a success event.
    fn on_success(&self) -> Option<EventCount>;

    /// Counts a failure event.
    fn on_failure(&self) -> Option<EventCount>;
}

/// Lock-free counter that accumulates for the lifetime of the process.
#[derive(Debug, Default)]
pub struct CumulativeEventCounter {
    success: AtomicU64,
    failure: AtomicU64,
}

impl CumulativeEventCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventCounter for CumulativeEventCounter {
    fn count(&self) -> EventCount {
        EventCount::new(
            self.success.load(Ordering::Acquire),
            self.failure.load(Ordering::Acquire),
        )
    }

    fn on_success(&self) -> Option<EventCount> {
        self.success.fetch_add(1, Ordering::AcqRel);
        Some(self.count())
    }

    fn on_failure(&self) -> Option<EventCount> {
        self.failure.fetch_add(1, Ordering::AcqRel);
        Some(self.count())
    }
}
