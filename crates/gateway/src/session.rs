//! Live session: one connection, one reader task, shared writer
//!
//! ```text
//!               ┌──────────────── reader task ────────────────┐
//! FrameReader ─►│ FrameAssembler ─► Dispatcher ─► observers   │
//!               │        │ ping         ├──► Correlator       │
//!               │        ▼              └──► Subscriptions    │
//!               │   writer slot ◄── reconnect + resubscribe   │
//!               └─────────────────────────────────────────────┘
//!                        ▲
//! send / send_and_wait ──┘ (waits for Connected, then locks the writer)
//! ```
//!
//! While the reader task reconnects it holds the writer lock, so senders
//! queue behind the reconnect instead of writing to a dead socket.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex as SyncMutex;
use pocket_core::{Config, RawMessage, Validator};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use url::Url;

use crate::codec::{Decoded, FrameAssembler};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::correlator::Correlator;
use crate::dispatcher::{Dispatcher, FrameObserver};
use crate::error::{GatewayError, Result};
use crate::subscription::{DEFAULT_BUFFER, Subscription, SubscriptionMode, SubscriptionRegistry};
use crate::transport::{Connector, FrameReader, FrameWriter};

type WriterSlot = Arc<Mutex<Option<Box<dyn FrameWriter>>>>;
type FatalSlot = Arc<SyncMutex<Option<GatewayError>>>;

pub struct SessionBuilder {
    connector: Arc<dyn Connector>,
    config: Config,
    urls: Vec<Url>,
    auth_frame: String,
    observers: Vec<Arc<dyn FrameObserver>>,
    buffer: usize,
}

impl SessionBuilder {
    pub fn urls(mut self, urls: Vec<Url>) -> Self {
        self.urls = urls;
        self
    }

    pub fn auth_frame(mut self, frame: impl Into<String>) -> Self {
        self.auth_frame = frame.into();
        self
    }

    /// Register an observer before the first frame is read
    pub fn observer(mut self, observer: Arc<dyn FrameObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Capacity of each subscription buffer
    pub fn subscription_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Connect, authenticate and start the reader task
    pub async fn connect(self) -> Result<Session> {
        let urls = if self.urls.is_empty() {
            self.config.urls().to_vec()
        } else {
            self.urls
        };
        let mut manager =
            ConnectionManager::new(self.connector, urls, self.auth_frame, self.config.clone())?;
        let state = manager.watch();
        let publisher = manager.state_publisher();

        let correlator = Arc::new(Correlator::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new(self.buffer));
        let dispatcher = Arc::new(Dispatcher::new(correlator, subscriptions));
        for observer in self.observers {
            dispatcher.add_observer(observer);
        }

        let link = manager.establish(false).await?;
        if let Some(url) = manager.active_url() {
            info!("Session connected to {}", url);
        }

        let writer: WriterSlot = Arc::new(Mutex::new(Some(link.writer)));
        let fatal: FatalSlot = Arc::new(SyncMutex::new(None));
        let reader = tokio::spawn(run_reader(
            manager,
            link.reader,
            writer.clone(),
            dispatcher.clone(),
            fatal.clone(),
        ));

        Ok(Session {
            config: self.config,
            dispatcher,
            writer,
            state,
            publisher,
            fatal,
            reader,
        })
    }
}

pub struct Session {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    writer: WriterSlot,
    state: watch::Receiver<ConnectionState>,
    publisher: Arc<watch::Sender<ConnectionState>>,
    fatal: FatalSlot,
    reader: JoinHandle<()>,
}

impl Session {
    pub fn builder(connector: Arc<dyn Connector>, config: Config) -> SessionBuilder {
        SessionBuilder {
            connector,
            config,
            urls: Vec::new(),
            auth_frame: String::new(),
            observers: Vec::new(),
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn add_observer(&self, observer: Arc<dyn FrameObserver>) {
        self.dispatcher.add_observer(observer);
    }

    /// Transmit a raw frame, waiting up to `timeout` for a connection
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        let deadline = Instant::now() + self.config.timeout();
        self.transmit(text.into(), deadline).await
    }

    /// Transmit `command` and wait for the first inbound message accepted
    /// by `validator`
    pub async fn send_and_wait(
        &self,
        command: impl Into<String>,
        validator: Validator,
        timeout: Duration,
    ) -> Result<RawMessage> {
        let deadline = Instant::now() + timeout;
        let (id, mut reply) = self.dispatcher.correlator().register(validator)?;

        if let Err(err) = self.transmit(command.into(), deadline).await {
            let faults = self.dispatcher.correlator().cancel(id).unwrap_or(0);
            if Instant::now() >= deadline {
                return Err(GatewayError::CorrelationTimeout {
                    timeout,
                    validator_faults: faults,
                });
            }
            return Err(err);
        }

        match timeout_at(deadline, &mut reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GatewayError::ChannelClosed),
            Err(_) => match self.dispatcher.correlator().cancel(id) {
                Some(faults) => {
                    debug!("Pending request {} timed out after {:?}", id, timeout);
                    Err(GatewayError::CorrelationTimeout {
                        timeout,
                        validator_faults: faults,
                    })
                }
                // Resolved between the deadline firing and the cancel
                None => reply.try_recv().unwrap_or(Err(GatewayError::ChannelClosed)),
            },
        }
    }

    /// [`Session::send_and_wait`] repeated up to `max_allowed_loops` times,
    /// sleeping `sleep_interval` between attempts
    pub async fn send_and_wait_with_retry(
        &self,
        command: impl Into<String>,
        validator: Validator,
        timeout: Duration,
    ) -> Result<RawMessage> {
        let command = command.into();
        let attempts = self.config.max_allowed_loops();
        let mut last_error = GatewayError::CorrelationTimeout {
            timeout,
            validator_faults: 0,
        };

        for attempt in 1..=attempts {
            match self
                .send_and_wait(command.clone(), validator.clone(), timeout)
                .await
            {
                Ok(message) => return Ok(message),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("Attempt {}/{} failed: {}", attempt, attempts, err);
                    last_error = err;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.sleep_interval()).await;
            }
        }
        Err(last_error)
    }

    /// Open a subscription; `command` (if any) is sent once the subscription
    /// is registered and again after every reconnect
    pub async fn subscribe(
        &self,
        filter: Validator,
        mode: SubscriptionMode,
        command: Option<String>,
    ) -> Result<Subscription> {
        let subscription = self
            .dispatcher
            .subscriptions()
            .open(filter, mode, command.clone())?;
        if let Some(command) = command {
            self.send(command).await?;
        }
        Ok(subscription)
    }

    /// Stop the reader task, end every subscription and fail pending
    /// requests. The state becomes `Disconnected` and later sends and
    /// subscribes fail with `ChannelClosed`.
    pub async fn shutdown(&self) {
        self.reader.abort();
        self.close_routes();
        // The reader holds the writer lock while it reconnects, so the state
        // published below is not overwritten by an aborted reconnect
        let mut slot = self.writer.lock().await;
        if let Some(mut writer) = slot.take() {
            if let Err(e) = writer.close().await {
                debug!("Error closing writer: {}", e);
            }
        }
        self.publish_disconnected();
    }

    fn close_routes(&self) {
        self.fatal.lock().get_or_insert(GatewayError::ChannelClosed);
        self.dispatcher.subscriptions().close_all();
        self.dispatcher.correlator().fail_all(&GatewayError::ChannelClosed);
    }

    fn publish_disconnected(&self) {
        self.publisher.send_if_modified(|state| match *state {
            ConnectionState::Failed | ConnectionState::Disconnected => false,
            _ => {
                info!("Session shut down");
                *state = ConnectionState::Disconnected;
                true
            }
        });
    }

    async fn transmit(&self, text: String, deadline: Instant) -> Result<()> {
        self.wait_connected(deadline).await?;
        let mut writer = timeout_at(deadline, self.writer.lock())
            .await
            .map_err(|_| not_connected())?;
        match writer.as_mut() {
            Some(writer) => {
                debug!("Sending {}", text);
                writer.send(text).await.map_err(|e| GatewayError::ConnectionFault(e.to_string()))
            }
            None => Err(self.fatal_error()),
        }
    }

    async fn wait_connected(&self, deadline: Instant) -> Result<()> {
        let mut state = self.state.clone();
        loop {
            let current = *state.borrow_and_update();
            match current {
                ConnectionState::Connected => return Ok(()),
                // A live session is only disconnected after shutdown
                ConnectionState::Failed | ConnectionState::Disconnected => {
                    return Err(self.fatal_error());
                }
                _ => {}
            }
            match timeout_at(deadline, state.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(self.fatal_error()),
                Err(_) => return Err(not_connected()),
            }
        }
    }

    fn fatal_error(&self) -> GatewayError {
        if let Some(err) = self.fatal.lock().clone() {
            return err;
        }
        match self.state() {
            ConnectionState::Failed => GatewayError::ConnectionFailed {
                attempts: self.config.max_allowed_loops(),
                reason: "reconnect attempts exhausted".to_string(),
            },
            _ => GatewayError::ChannelClosed,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
        self.close_routes();
        self.publish_disconnected();
    }
}

fn not_connected() -> GatewayError {
    GatewayError::ConnectionFault("not connected before the deadline".to_string())
}

async fn run_reader(
    mut manager: ConnectionManager,
    mut reader: Box<dyn FrameReader>,
    writer: WriterSlot,
    dispatcher: Arc<Dispatcher>,
    fatal: FatalSlot,
) {
    loop {
        pump(reader.as_mut(), &writer, &dispatcher).await;

        let mut slot = writer.lock().await;
        slot.take();
        manager.lost();

        match manager.establish(true).await {
            Ok(link) => {
                let mut new_writer = link.writer;
                for command in dispatcher.subscriptions().opening_commands() {
                    debug!("Resubscribing with {}", command);
                    if let Err(e) = new_writer.send(command).await {
                        warn!("Resubscribe failed: {}", e);
                    }
                }
                *slot = Some(new_writer);
                reader = link.reader;
                info!("Session reconnected");
            }
            Err(err) => {
                error!("Session failed: {}", err);
                *fatal.lock() = Some(err.clone());
                drop(slot);
                dispatcher.correlator().fail_all(&err);
                dispatcher.subscriptions().fail_all(&err);
                return;
            }
        }
    }
}

/// Read and dispatch frames until the connection is lost
async fn pump(reader: &mut dyn FrameReader, writer: &WriterSlot, dispatcher: &Dispatcher) {
    let mut assembler = FrameAssembler::new();
    loop {
        let frame = match reader.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!("Connection lost: {}", e);
                return;
            }
            None => {
                warn!("Connection closed");
                return;
            }
        };

        match assembler.decode(frame) {
            Ok(Decoded::Message(message)) => dispatcher.dispatch(message).await,
            Ok(Decoded::Ping) => {
                if let Some(writer) = writer.lock().await.as_mut() {
                    if let Err(e) = writer.send("3".to_string()).await {
                        warn!("Failed to answer ping: {}", e);
                    }
                }
            }
            Ok(Decoded::Closed) => {
                info!("Server closed the connection");
                return;
            }
            Ok(Decoded::Control(text)) => debug!("Control frame {}", text),
            Ok(Decoded::Pending) => {}
            Err(e) => warn!("Dropping malformed frame: {}", e),
        }
    }
}
