//! Error types for the gateway crate

use std::time::Duration;

use pocket_core::{ConfigError, FrameError, ValidatorFault};
use thiserror::Error;

/// Transport-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Transport closed")]
    Closed,
}

/// Gateway-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Handshake or transport failure on one attempt; retried
    #[error("Connection fault: {0}")]
    ConnectionFault(String),

    /// Retries exhausted; the session is dead
    #[error("Connection failed after {attempts} attempts: {reason}")]
    ConnectionFailed { attempts: u32, reason: String },

    #[error("No matching response within {timeout:?} ({validator_faults} validator faults)")]
    CorrelationTimeout {
        timeout: Duration,
        validator_faults: u32,
    },

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),

    #[error(transparent)]
    ValidatorFault(#[from] ValidatorFault),

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Channel closed")]
    ChannelClosed,
}

impl GatewayError {
    /// Faults after which retrying the same call cannot succeed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::ConnectionFailed { .. }
                | GatewayError::ChannelClosed
                | GatewayError::Configuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
