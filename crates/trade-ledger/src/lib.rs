//! Pocket Trade Ledger
//!
//! Tracks every deal the session knows about, from order confirmation to
//! settlement, and resolves win/loss for callers:
//!
//! ```text
//! Dispatcher ──► LedgerObserver ──► TradeLedger ◄── check_win (polls every 500 ms)
//!   successopenOrder / updateOpenedDeals      submit
//!   successcloseOrder / updateClosedDeals     settle
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let ledger = Arc::new(TradeLedger::new(Arc::new(SystemClock), config.extra_duration()));
//! let session = Session::builder(connector, config)
//!     .observer(Arc::new(LedgerObserver::new(ledger.clone())))
//!     .connect()
//!     .await?;
//!
//! let trade = ledger.check_win(trade_id).await?;
//! ```

pub mod error;
pub mod ledger;
pub mod observer;

pub use error::{Error, Result};
pub use ledger::{MIN_WAIT, POLL_INTERVAL, TradeLedger};
pub use observer::LedgerObserver;
