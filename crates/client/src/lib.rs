//! Pocket Client
//!
//! Async facade over one authenticated PocketOption session, plus a
//! blocking adapter and process-wide logging setup.
//!
//! ## Architecture
//!
//! ```text
//!            PocketClient / BlockingClient
//!   buy/sell  check_win  candles  subscribe  raw orders
//!       │         │         │         │          │
//!       │    ┌────▼─────┐   │         │          │
//!       │    │  Trade   │   │         │          │
//!       │    │  Ledger  │◄──┼── LedgerObserver ◄─┐
//!       │    └──────────┘   │                     │
//!       │         SessionState ◄── observer ◄─────┤
//!   ┌───▼───────────────────▼─────────▼──────────▼───┐
//!   │               pocket_gateway::Session          │
//!   └───────────────────────┬────────────────────────┘
//!                           │ socket.io over wss
//!                       Platform
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use pocket_client::PocketClient;
//!
//! # async fn run() -> pocket_client::Result<()> {
//! let client = PocketClient::new(r#"42["auth",{"session":"...","isDemo":1,"uid":1,"platform":2}]"#, None).await?;
//! let (id, _deal) = client.buy("EURUSD_otc", 1.0, 60).await?;
//! let settled = client.check_win(id).await?;
//! println!("{}", settled);
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod client;
pub mod error;
pub mod logging;
pub mod state;

pub use blocking::{BlockingClient, BlockingSubscription};
pub use client::{ClientBuilder, PocketClient};
pub use error::{Error, Result};
pub use logging::{LogConfig, LogTarget, LoggingError};
pub use state::SessionState;

pub use pocket_core::{Config, ConfigBuilder, RawMessage, Validator};
pub use pocket_gateway::{ConnectionState, StreamItem, Subscription};
