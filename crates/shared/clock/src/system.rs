use chrono::Utc;
use pocket_core::Timestamp;

use crate::Clock;

/// Wall clock used by live sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}
