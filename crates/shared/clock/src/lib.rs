//! Pocket Clock
//!
//! Wall-clock abstraction used for trade expiry and server time:
//!
//! ```text
//! Clock (port)
//!     ├── SystemClock    Utc::now()
//!     ├── AnchoredClock  fixed start + elapsed tokio time (follows paused test time)
//!     └── ManualClock    only moves when told to
//! ```

mod anchored;
mod manual;
mod system;

pub use anchored::AnchoredClock;
pub use manual::ManualClock;
pub use system::SystemClock;

use pocket_core::Timestamp;

/// Port for time abstraction
///
/// Expiry arithmetic goes through this trait so tests can run against
/// virtual or fixed time instead of the wall clock.
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> Timestamp;

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
