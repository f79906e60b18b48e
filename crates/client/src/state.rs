//! Latest values pushed by the platform: balance, asset list, server time

use std::time::Duration;

use log::debug;
use parking_lot::RwLock;
use pocket_core::{EventFrame, events};
use pocket_gateway::FrameObserver;
use serde_json::Value;
use tokio::sync::watch;

pub struct SessionState {
    balance: watch::Sender<Option<Value>>,
    assets: watch::Sender<Option<Value>>,
    server_time: RwLock<Option<f64>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            balance: watch::channel(None).0,
            assets: watch::channel(None).0,
            server_time: RwLock::new(None),
        }
    }

    /// Last `successupdateBalance` payload
    pub fn balance(&self) -> Option<Value> {
        self.balance.borrow().clone()
    }

    /// Last `updateAssets` payload
    pub fn assets(&self) -> Option<Value> {
        self.assets.borrow().clone()
    }

    /// Time of the latest price tick, unix seconds
    pub fn server_time(&self) -> Option<i64> {
        self.server_time.read().map(|t| t.floor() as i64)
    }

    pub async fn wait_balance(&self, timeout: Duration) -> Option<Value> {
        wait_for(&self.balance, timeout).await
    }

    pub async fn wait_assets(&self, timeout: Duration) -> Option<Value> {
        wait_for(&self.assets, timeout).await
    }

    fn record_ticks(&self, payload: &Value) {
        let latest = payload
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|tick| tick.get(1).and_then(Value::as_f64))
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));
        if let Some(time) = latest {
            let mut current = self.server_time.write();
            if current.is_none_or(|c| time > c) {
                *current = Some(time);
            }
        }
    }
}

async fn wait_for(slot: &watch::Sender<Option<Value>>, timeout: Duration) -> Option<Value> {
    let mut rx = slot.subscribe();
    let ready = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await;
    match ready {
        Ok(Ok(value)) => value.clone(),
        _ => None,
    }
}

impl FrameObserver for SessionState {
    fn observe(&self, event: &EventFrame) {
        match event.name.as_str() {
            events::SUCCESS_UPDATE_BALANCE => {
                debug!("Balance update: {}", event.payload);
                self.balance.send_replace(Some(event.payload.clone()));
            }
            events::UPDATE_ASSETS => {
                self.assets.send_replace(Some(event.payload.clone()));
            }
            events::UPDATE_STREAM => self.record_ticks(&event.payload),
            _ => {}
        }
    }
}
