//! Pocket Core Domain
//!
//! Pure types shared by every Pocket crate: configuration, the validator
//! engine, trade entities, raw messages and socket.io framing helpers.
//! This crate contains no async and no I/O.

pub mod config;
pub mod entities;
pub mod error;
pub mod message;
pub mod ssid;
pub mod validator;
pub mod values;

// Re-export commonly used types at crate root
pub use config::{Config, ConfigBuilder, ConfigFile};
pub use entities::{Direction, Trade, TradeId, TradeResult, TradeStatus};
pub use error::{ConfigError, FrameError, SsidError, ValidatorError, ValidatorFault};
pub use message::{EventFrame, Packet, RawMessage, commands, events};
pub use ssid::Ssid;
pub use validator::{Evaluation, Predicate, Validator};
pub use values::{Amount, Asset, Timestamp};
