//! Request/response correlation
//!
//! Each correlated send registers a [`Validator`] under a monotonically
//! increasing id. Inbound messages are offered to pending requests in
//! registration order and the first match claims the message. A request is
//! removed exactly once: on match, on cancellation (deadline), or by
//! [`Correlator::fail_all`].

use std::collections::BTreeMap;

use log::{debug, warn};
use parking_lot::Mutex;
use pocket_core::{Evaluation, RawMessage, Validator};
use tokio::sync::oneshot;

use crate::error::{GatewayError, Result};

pub type Reply = Result<RawMessage>;

struct PendingRequest {
    validator: Validator,
    reply: oneshot::Sender<Reply>,
    faults: u32,
}

#[derive(Default)]
struct Pending {
    requests: BTreeMap<u64, PendingRequest>,
    next_id: u64,
    closed: Option<GatewayError>,
}

#[derive(Default)]
pub struct Correlator {
    pending: Mutex<Pending>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request; fails once the correlator was shut down
    pub fn register(&self, validator: Validator) -> Result<(u64, oneshot::Receiver<Reply>)> {
        let mut pending = self.pending.lock();
        if let Some(err) = &pending.closed {
            return Err(err.clone());
        }
        let id = pending.next_id;
        pending.next_id += 1;
        let (reply, rx) = oneshot::channel();
        pending.requests.insert(
            id,
            PendingRequest {
                validator,
                reply,
                faults: 0,
            },
        );
        Ok((id, rx))
    }

    /// Remove a request that gave up. Returns the validator faults it saw,
    /// or `None` if it was already resolved.
    pub fn cancel(&self, id: u64) -> Option<u32> {
        self.pending
            .lock()
            .requests
            .remove(&id)
            .map(|request| request.faults)
    }

    /// Offer an inbound message; returns `true` if a pending request claimed it
    pub fn offer(&self, message: &RawMessage) -> bool {
        let mut pending = self.pending.lock();
        let mut claimed = None;

        for (id, request) in pending.requests.iter_mut() {
            match request.validator.evaluate(message) {
                Evaluation::Match => {
                    claimed = Some(*id);
                    break;
                }
                Evaluation::NoMatch => {}
                Evaluation::Fault(fault) => {
                    request.faults += 1;
                    warn!("Pending request {}: {}", id, fault);
                }
            }
        }

        let Some(id) = claimed else {
            return false;
        };
        if let Some(request) = pending.requests.remove(&id) {
            debug!("Pending request {} resolved", id);
            if request.reply.send(Ok(message.clone())).is_err() {
                debug!("Pending request {} was abandoned by its caller", id);
            }
        }
        true
    }

    /// Resolve every pending request with `err` and refuse new ones
    pub fn fail_all(&self, err: &GatewayError) {
        let requests = {
            let mut pending = self.pending.lock();
            if pending.closed.is_none() {
                pending.closed = Some(err.clone());
            }
            std::mem::take(&mut pending.requests)
        };
        for (_, request) in requests {
            let _ = request.reply.send(Err(err.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
