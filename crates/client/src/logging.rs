//! Process-wide logger setup
//!
//! ```no_run
//! use pocket_client::logging::{self, LogConfig, LogTarget};
//!
//! logging::init(
//!     LogConfig::new(log::LevelFilter::Info)
//!         .filters("pocket_gateway=debug")
//!         .target(LogTarget::Stdout),
//! )
//! .unwrap();
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use env_logger::{Builder, Target};
use log::LevelFilter;
use thiserror::Error;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Logging is already initialized")]
    AlreadyInitialized,

    #[error("Cannot open log file {path:?}: {reason}")]
    File { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    Stderr,
    Stdout,
    /// Append to a file
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    /// env_logger filter directives, e.g. `pocket_gateway=debug,pocket_ledger=warn`
    pub filters: Option<String>,
    pub target: LogTarget,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(LevelFilter::Info)
    }
}

impl LogConfig {
    pub fn new(level: LevelFilter) -> Self {
        Self {
            level,
            filters: None,
            target: LogTarget::Stderr,
        }
    }

    pub fn filters(mut self, filters: impl Into<String>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }
}

/// Install the global logger. Only the first call in a process succeeds.
pub fn init(config: LogConfig) -> Result<(), LoggingError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(LoggingError::AlreadyInitialized);
    }

    let mut builder = Builder::new();
    builder.filter_level(config.level);
    if let Some(filters) = &config.filters {
        builder.parse_filters(filters);
    }

    match &config.target {
        LogTarget::Stderr => {
            builder.target(Target::Stderr);
        }
        LogTarget::Stdout => {
            builder.target(Target::Stdout);
        }
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    INITIALIZED.store(false, Ordering::SeqCst);
                    LoggingError::File {
                        path: path.clone(),
                        reason: e.to_string(),
                    }
                })?;
            builder.target(Target::Pipe(Box::new(file)));
        }
    }

    // Another logger installed outside this module still counts
    builder
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
