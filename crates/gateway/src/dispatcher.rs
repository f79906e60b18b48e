//! Message dispatcher
//!
//! Every inbound message goes through three stages, in this order:
//!
//! 1. frame observers (side channels such as the trade ledger) see every event
//! 2. the correlator; at most one pending request claims the message
//! 3. if unclaimed, every matching subscription receives it
//!
//! Messages are dispatched one at a time, in arrival order.

use std::sync::Arc;

use log::{debug, trace};
use parking_lot::RwLock;
use pocket_core::{EventFrame, RawMessage};

use crate::correlator::Correlator;
use crate::subscription::SubscriptionRegistry;

/// Side channel that sees every decoded event before routing
pub trait FrameObserver: Send + Sync {
    fn observe(&self, event: &EventFrame);
}

pub struct Dispatcher {
    observers: RwLock<Vec<Arc<dyn FrameObserver>>>,
    correlator: Arc<Correlator>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl Dispatcher {
    pub fn new(correlator: Arc<Correlator>, subscriptions: Arc<SubscriptionRegistry>) -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            correlator,
            subscriptions,
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn FrameObserver>) {
        self.observers.write().push(observer);
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub async fn dispatch(&self, message: RawMessage) {
        trace!("Dispatching {}", message);

        if let Some(event) = message.event() {
            let observers = self.observers.read().clone();
            for observer in observers {
                observer.observe(&event);
            }
        }

        if self.correlator.offer(&message) {
            return;
        }

        for delivery in self.subscriptions.route(&message) {
            let sent = match delivery.deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, delivery.tx.send(delivery.item)).await {
                        Ok(sent) => sent.is_ok(),
                        Err(_) => false,
                    }
                }
                None => delivery.tx.send(delivery.item).await.is_ok(),
            };
            if !sent {
                debug!("Subscription {} no longer receiving", delivery.subscription);
            }
        }
    }
}
