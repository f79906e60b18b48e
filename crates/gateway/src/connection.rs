//! Connection lifecycle
//!
//! ```text
//!                  ┌─ fail ─┐
//!                  ▼        │
//!  Disconnected ──► Connecting ──► Connected ◄────────────┐
//!                       │              │ I/O error/close   │ handshake ok
//!                       │              ▼                   │
//!                       │         Reconnecting ────────────┘
//!                       │              │
//!                       └──────────────┤ max_allowed_loops failures
//!                                      ▼
//!                                    Failed
//! ```
//!
//! The initial connect stays in `Connecting` across failed attempts;
//! `Reconnecting` is only entered after an established connection is lost.
//!
//! The manager owns the candidate urls and the retry counter. State is
//! published on a watch channel so senders can wait for `Connected`.

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};
use pocket_core::events;
use pocket_core::{Config, EventFrame};
use tokio::sync::watch;
use url::Url;

use crate::codec::{Decoded, FrameAssembler};
use crate::error::{GatewayError, Result};
use crate::transport::{Connector, Link};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal; a new client is required
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    urls: Vec<Url>,
    auth_frame: String,
    config: Config,
    next_url: usize,
    failures: u32,
    active_url: Option<Url>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        urls: Vec<Url>,
        auth_frame: String,
        config: Config,
    ) -> Result<Self> {
        if urls.is_empty() {
            return Err(GatewayError::ConnectionFault(
                "no candidate urls configured".to_string(),
            ));
        }
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let state_tx = Arc::new(state_tx);
        Ok(Self {
            connector,
            urls,
            auth_frame,
            config,
            next_url: 0,
            failures: 0,
            active_url: None,
            state_tx,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Publisher of the connection state, for owners that outlive the
    /// manager (shutdown publishes `Disconnected` through it)
    pub fn state_publisher(&self) -> Arc<watch::Sender<ConnectionState>> {
        Arc::clone(&self.state_tx)
    }

    pub fn active_url(&self) -> Option<&Url> {
        self.active_url.as_ref()
    }

    /// Consecutive failed attempts in the current outage
    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            info!("Connection state {} -> {}", current, state);
            *current = state;
            true
        });
    }

    /// Mark the current connection as lost
    pub fn lost(&mut self) {
        self.active_url = None;
        self.set_state(ConnectionState::Reconnecting);
    }

    /// Connect and authenticate, retrying across candidate urls.
    ///
    /// With `reconnecting` set, every attempt (including the first) is
    /// preceded by `reconnect_time` and the state is `Reconnecting`;
    /// otherwise the state stays `Connecting` until the first success. After `max_allowed_loops` consecutive
    /// failures the state becomes `Failed` and `ConnectionFailed` is returned.
    pub async fn establish(&mut self, reconnecting: bool) -> Result<Link> {
        if self.state() == ConnectionState::Failed {
            return Err(self.failed_error("connection already failed".to_string()));
        }

        let retry_state = if reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        let mut wait = reconnecting;
        loop {
            self.set_state(retry_state);
            if wait {
                tokio::time::sleep(self.config.reconnect_time()).await;
            }

            let url = self.urls[self.next_url % self.urls.len()].clone();
            self.next_url = (self.next_url + 1) % self.urls.len();
            debug!("Connecting to {} (attempt {})", url, self.failures + 1);

            let attempt = tokio::time::timeout(
                self.config.connection_initialization_timeout(),
                self.attempt(&url),
            )
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::ConnectionFault(format!(
                    "handshake not completed within {:?}",
                    self.config.connection_initialization_timeout()
                )))
            });

            match attempt {
                Ok(link) => {
                    self.failures = 0;
                    self.active_url = Some(url);
                    self.set_state(ConnectionState::Connected);
                    return Ok(link);
                }
                Err(err) => {
                    self.failures += 1;
                    warn!(
                        "Connection attempt {}/{} to {} failed: {}",
                        self.failures,
                        self.config.max_allowed_loops(),
                        url,
                        err
                    );
                    if self.failures >= self.config.max_allowed_loops() {
                        let err = self.failed_error(err.to_string());
                        error!("{}", err);
                        self.set_state(ConnectionState::Failed);
                        return Err(err);
                    }
                    wait = true;
                }
            }
        }
    }

    fn failed_error(&self, reason: String) -> GatewayError {
        GatewayError::ConnectionFailed {
            attempts: self.failures,
            reason,
        }
    }

    /// One connect + socket.io handshake
    async fn attempt(&self, url: &Url) -> Result<Link> {
        let mut link = self.connector.connect(url).await?;
        let mut assembler = FrameAssembler::new();

        loop {
            let frame = match link.reader.next().await {
                Some(frame) => frame?,
                None => {
                    return Err(GatewayError::ConnectionFault(
                        "closed during handshake".to_string(),
                    ));
                }
            };
            let decoded = match assembler.decode(frame) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("Dropping malformed handshake frame: {}", e);
                    continue;
                }
            };

            match decoded {
                Decoded::Ping => link.writer.send("3".to_string()).await?,
                Decoded::Control(text) if text.starts_with('0') => {
                    link.writer.send("40".to_string()).await?
                }
                Decoded::Control(text) if text.starts_with("40") => {
                    link.writer.send(self.auth_frame.clone()).await?
                }
                Decoded::Message(message) => match EventFrame::parse(&message) {
                    Ok(event) if event.name == events::SUCCESS_AUTH => {
                        debug!("Authenticated on {}", url);
                        return Ok(link);
                    }
                    Ok(event) if event.name == events::NOT_AUTHORIZED => {
                        return Err(GatewayError::ConnectionFault(
                            "session not authorized".to_string(),
                        ));
                    }
                    _ => debug!("Ignoring pre-auth message: {}", message),
                },
                Decoded::Closed => {
                    return Err(GatewayError::ConnectionFault(
                        "closed during handshake".to_string(),
                    ));
                }
                Decoded::Control(_) | Decoded::Pending => {}
            }
        }
    }
}
