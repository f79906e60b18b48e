//! Error types for the core crate

use thiserror::Error;

/// Invalid configuration values, raised when a `Config` is built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_allowed_loops must be at least 1")]
    ZeroLoops,

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("Invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid config file: {0}")]
    Parse(String),
}

/// Validator construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidatorError {
    #[error("Invalid regex pattern: {0}")]
    Regex(String),
}

impl From<regex::Error> for ValidatorError {
    fn from(e: regex::Error) -> Self {
        ValidatorError::Regex(e.to_string())
    }
}

/// A custom predicate panicked while evaluating a message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validator fault in custom predicate: {0}")]
pub struct ValidatorFault(pub String);

/// Session id could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SsidError {
    #[error("Empty session id")]
    Empty,

    #[error("Malformed auth frame: {0}")]
    Malformed(String),
}

/// An inbound frame that could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame is not a socket.io event")]
    NotAnEvent,

    #[error("Invalid JSON in frame: {0}")]
    InvalidJson(String),

    #[error("Binary payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Binary frame without a preceding event header")]
    OrphanBinary,
}
