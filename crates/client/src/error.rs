//! Client errors

use pocket_core::{ConfigError, SsidError, ValidatorError};
use pocket_gateway::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] pocket_ledger::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid session id: {0}")]
    Ssid(#[from] SsidError),

    #[error("Invalid validator: {0}")]
    Validator(#[from] ValidatorError),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, Error>;
