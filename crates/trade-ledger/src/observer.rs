//! Feeds platform deal events into the ledger
//!
//! | event               | payload                       | effect         |
//! |---------------------|-------------------------------|----------------|
//! | `successopenOrder`  | deal                          | submit         |
//! | `updateOpenedDeals` | `[deal, ..]`                  | submit each    |
//! | `successcloseOrder` | `{"profit":..,"deals":[..]}`  | settle each    |
//! | `updateClosedDeals` | `[deal, ..]`                  | settle each    |

use std::sync::Arc;

use log::{debug, warn};
use pocket_core::{EventFrame, events};
use pocket_gateway::FrameObserver;
use serde_json::Value;

use crate::ledger::TradeLedger;

pub struct LedgerObserver {
    ledger: Arc<TradeLedger>,
}

impl LedgerObserver {
    pub fn new(ledger: Arc<TradeLedger>) -> Self {
        Self { ledger }
    }

    fn open(&self, deal: &Value) {
        if self.ledger.record_opened(deal).is_none() {
            warn!("Ignoring opened deal without id/asset: {}", deal);
        }
    }

    fn close(&self, deal: &Value) {
        if self.ledger.record_closed(deal).is_none() {
            debug!("Closed deal not settled (missing id or profit): {}", deal);
        }
    }
}

fn deals(payload: &Value) -> &[Value] {
    payload.as_array().map(Vec::as_slice).unwrap_or(&[])
}

impl FrameObserver for LedgerObserver {
    fn observe(&self, event: &EventFrame) {
        match event.name.as_str() {
            events::SUCCESS_OPEN_ORDER => self.open(&event.payload),
            events::UPDATE_OPENED_DEALS => deals(&event.payload).iter().for_each(|d| self.open(d)),
            events::SUCCESS_CLOSE_ORDER => {
                let closed = event.payload.get("deals").map(deals).unwrap_or(&[]);
                closed.iter().for_each(|d| self.close(d));
            }
            events::UPDATE_CLOSED_DEALS => deals(&event.payload).iter().for_each(|d| self.close(d)),
            _ => {}
        }
    }
}
