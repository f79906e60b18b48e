//! Subscription stream engine
//!
//! A subscription is a filter plus a bounded channel from the dispatcher to
//! one consumer. The dispatcher collects deliveries under the registry lock
//! and awaits the bounded sends after releasing it, so a slow consumer
//! blocks the dispatcher instead of losing messages.
//!
//! ```text
//!               route()                        send().await
//! Dispatcher ───────────► SubscriptionRegistry ─────────────► Subscription (Stream)
//!                          filter / batch / expiry               bounded mpsc
//! ```

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::Stream;
use log::{debug, warn};
use parking_lot::Mutex;
use pocket_core::{Evaluation, RawMessage, Validator};
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};

use crate::error::{GatewayError, Result};

pub const DEFAULT_BUFFER: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Every match is yielded on its own
    Plain,
    /// Matches are yielded in batches of exactly `n`
    Chunked(NonZeroUsize),
    /// Like `Plain`, closing once the duration has elapsed since opening
    Timed(Duration),
}

/// One item read from a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Single(RawMessage),
    Chunk(Vec<RawMessage>),
}

impl StreamItem {
    /// Flatten into the messages it carries
    pub fn into_messages(self) -> Vec<RawMessage> {
        match self {
            StreamItem::Single(message) => vec![message],
            StreamItem::Chunk(messages) => messages,
        }
    }
}

/// Fatal fault shared between a registry entry and its consumer
type FaultSlot = Arc<Mutex<Option<GatewayError>>>;

/// Custom predicate faults, shared the same way
type FaultCount = Arc<AtomicU32>;

struct Entry {
    filter: Validator,
    mode: SubscriptionMode,
    expires_at: Option<Instant>,
    tx: mpsc::Sender<StreamItem>,
    batch: Vec<RawMessage>,
    command: Option<String>,
    fault: FaultSlot,
    validator_faults: FaultCount,
}

/// A delivery collected by [`SubscriptionRegistry::route`]
pub struct Delivery {
    pub subscription: u64,
    pub tx: mpsc::Sender<StreamItem>,
    pub item: StreamItem,
    /// Timed subscriptions: the send must not outlive the expiry
    pub deadline: Option<Instant>,
}

pub struct SubscriptionRegistry {
    entries: DashMap<u64, Entry>,
    next_id: AtomicU64,
    buffer: usize,
    closed: Mutex<Option<GatewayError>>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl SubscriptionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            closed: Mutex::new(None),
        }
    }

    /// Open a subscription. `command` is remembered so it can be re-sent
    /// after a reconnect.
    pub fn open(
        self: &Arc<Self>,
        filter: Validator,
        mode: SubscriptionMode,
        command: Option<String>,
    ) -> Result<Subscription> {
        if let Some(err) = self.closed.lock().clone() {
            return Err(err);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let fault: FaultSlot = Arc::new(Mutex::new(None));
        let validator_faults: FaultCount = Arc::new(AtomicU32::new(0));
        let expires_at = match mode {
            SubscriptionMode::Timed(duration) => Some(Instant::now() + duration),
            _ => None,
        };

        self.entries.insert(
            id,
            Entry {
                filter,
                mode,
                expires_at,
                tx,
                batch: Vec::new(),
                command,
                fault: fault.clone(),
                validator_faults: validator_faults.clone(),
            },
        );
        debug!("Subscription {} opened ({:?})", id, mode);

        Ok(Subscription {
            id,
            rx,
            expiry: expires_at.map(|at| Box::pin(tokio::time::sleep_until(at))),
            fault,
            validator_faults,
            registry: Arc::clone(self),
            done: false,
        })
    }

    /// Match a message against every open subscription and collect the
    /// resulting deliveries. Expired timed subscriptions are closed here.
    pub fn route(&self, message: &RawMessage) -> Vec<Delivery> {
        let now = Instant::now();
        let mut deliveries = Vec::new();
        let mut expired = Vec::new();

        for mut entry in self.entries.iter_mut() {
            let id = *entry.key();
            let entry = entry.value_mut();

            if entry.expires_at.is_some_and(|at| at <= now) {
                expired.push(id);
                continue;
            }
            match entry.filter.evaluate(message) {
                Evaluation::Match => {}
                Evaluation::NoMatch => continue,
                Evaluation::Fault(fault) => {
                    entry.validator_faults.fetch_add(1, Ordering::Relaxed);
                    warn!("Subscription {}: {}", id, fault);
                    continue;
                }
            }

            let item = match entry.mode {
                SubscriptionMode::Chunked(size) => {
                    entry.batch.push(message.clone());
                    if entry.batch.len() < size.get() {
                        continue;
                    }
                    StreamItem::Chunk(std::mem::take(&mut entry.batch))
                }
                SubscriptionMode::Plain | SubscriptionMode::Timed(_) => {
                    StreamItem::Single(message.clone())
                }
            };
            deliveries.push(Delivery {
                subscription: id,
                tx: entry.tx.clone(),
                item,
                deadline: entry.expires_at,
            });
        }

        for id in expired {
            if self.entries.remove(&id).is_some() {
                debug!("Subscription {} expired", id);
            }
        }
        deliveries
    }

    /// Opening commands of every live subscription, in id order
    pub fn opening_commands(&self) -> Vec<String> {
        let mut commands: Vec<(u64, String)> = self
            .entries
            .iter()
            .filter_map(|entry| entry.command.clone().map(|cmd| (*entry.key(), cmd)))
            .collect();
        commands.sort_by_key(|(id, _)| *id);
        commands.into_iter().map(|(_, cmd)| cmd).collect()
    }

    pub fn remove(&self, id: u64) {
        if self.entries.remove(&id).is_some() {
            debug!("Subscription {} closed", id);
        }
    }

    /// Close every subscription with end-of-stream and refuse new ones
    /// with `ChannelClosed`
    pub fn close_all(&self) {
        self.closed.lock().get_or_insert(GatewayError::ChannelClosed);
        self.entries.clear();
    }

    /// Deliver `err` to every open subscription exactly once, close them,
    /// and refuse new ones
    pub fn fail_all(&self, err: &GatewayError) {
        {
            let mut closed = self.closed.lock();
            if closed.is_none() {
                *closed = Some(err.clone());
            }
        }
        let ids: Vec<u64> = self.entries.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                let mut slot = entry.fault.lock();
                if slot.is_none() {
                    *slot = Some(err.clone());
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Consumer handle of a subscription
///
/// Yields `Ok(item)` per match (or per batch), at most one `Err` carrying a
/// fatal connection fault, then end-of-stream. Dropping it closes the
/// subscription.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<StreamItem>,
    expiry: Option<Pin<Box<Sleep>>>,
    fault: FaultSlot,
    validator_faults: FaultCount,
    registry: Arc<SubscriptionRegistry>,
    done: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read the next item; `None` at end-of-stream
    pub async fn next_item(&mut self) -> Option<Result<StreamItem>> {
        futures_util::StreamExt::next(self).await
    }

    /// Stop receiving; buffered items are discarded
    pub fn unsubscribe(&mut self) {
        self.finish();
    }

    pub fn is_closed(&self) -> bool {
        self.done
    }

    /// Messages whose filter evaluation faulted; they were skipped
    pub fn validator_faults(&self) -> u32 {
        self.validator_faults.load(Ordering::Relaxed)
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            self.rx.close();
            self.registry.remove(self.id);
        }
    }
}

impl Stream for Subscription {
    type Item = Result<StreamItem>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        if let Some(expiry) = self.expiry.as_mut() {
            if expiry.as_mut().poll(cx).is_ready() {
                self.finish();
                return Poll::Ready(None);
            }
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(Ok(item))),
            Poll::Ready(None) => {
                let fault = self.fault.lock().take();
                self.finish();
                Poll::Ready(fault.map(Err))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
