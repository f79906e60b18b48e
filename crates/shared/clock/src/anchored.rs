use chrono::{Duration, Utc};
use pocket_core::Timestamp;
use tokio::time::Instant;

use crate::Clock;

/// Clock that starts at a fixed timestamp and advances with tokio time
///
/// Under `tokio::time::pause()` the clock moves only when the runtime's
/// virtual time does, which keeps expiry arithmetic consistent with
/// `tokio::time::sleep` in tests.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    start_wall: Timestamp,
    start_instant: Instant,
}

impl AnchoredClock {
    /// Anchor at `initial_time`, or at the current wall time when `None`
    pub fn new(initial_time: Option<Timestamp>) -> Self {
        Self {
            start_wall: initial_time.unwrap_or_else(Utc::now),
            start_instant: Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> Timestamp {
        let elapsed = Duration::from_std(self.start_instant.elapsed()).unwrap_or_else(|_| Duration::zero());
        self.start_wall + elapsed
    }

    fn name(&self) -> &str {
        "AnchoredClock"
    }
}
