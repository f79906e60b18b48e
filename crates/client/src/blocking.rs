//! Blocking adapter for callers without an async runtime
//!
//! [`BlockingClient`] owns a multi-threaded tokio runtime. The session's
//! reader task keeps running on it between calls, so pushes (balance,
//! deal settlements, ticks) are processed even while the caller is idle.
//!
//! Dropping the client shuts the session down. When that happens on a
//! thread that is itself running async code, the shutdown runs on a scoped
//! helper thread and the runtime is released with `shutdown_background`.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;

use pocket_core::{Config, RawMessage, TradeId, Validator};
use pocket_gateway::{ConnectionState, GatewayError, StreamItem, Subscription};
use tokio::runtime::{Builder, Handle, Runtime};

use crate::client::{ClientBuilder, PocketClient};
use crate::error::{Error, Result};

pub struct BlockingClient {
    // Dropped before the runtime it runs on
    client: PocketClient,
    runtime: SharedRuntime,
}

impl BlockingClient {
    pub fn new(ssid: impl Into<String>, config: Option<Config>) -> Result<Self> {
        let runtime = runtime()?;
        let client = runtime.block_on(PocketClient::new(ssid, config))?;
        Ok(Self { client, runtime })
    }

    pub fn new_with_url(
        ssid: impl Into<String>,
        url: impl Into<String>,
        config: Option<Config>,
    ) -> Result<Self> {
        let runtime = runtime()?;
        let client = runtime.block_on(PocketClient::new_with_url(ssid, url, config))?;
        Ok(Self { client, runtime })
    }

    /// Connect from a configured builder (custom transport or clock)
    pub fn connect(builder: ClientBuilder) -> Result<Self> {
        let runtime = runtime()?;
        let client = runtime.block_on(builder.connect())?;
        Ok(Self { client, runtime })
    }

    /// The async client, for calls not mirrored here
    pub fn client(&self) -> &PocketClient {
        &self.client
    }

    pub fn is_demo(&self) -> bool {
        self.client.is_demo()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.connection_state()
    }

    pub fn buy(&self, asset: &str, amount: f64, duration_secs: u32) -> Result<(TradeId, String)> {
        self.runtime.block_on(self.client.buy(asset, amount, duration_secs))
    }

    pub fn sell(&self, asset: &str, amount: f64, duration_secs: u32) -> Result<(TradeId, String)> {
        self.runtime.block_on(self.client.sell(asset, amount, duration_secs))
    }

    pub fn check_win(&self, id: TradeId) -> Result<String> {
        self.runtime.block_on(self.client.check_win(id))
    }

    pub fn get_deal_end_time(&self, id: TradeId) -> Option<i64> {
        self.client.get_deal_end_time(id)
    }

    pub fn opened_deals(&self) -> String {
        self.client.opened_deals()
    }

    pub fn closed_deals(&self) -> String {
        self.client.closed_deals()
    }

    pub fn clear_closed_deals(&self) {
        self.client.clear_closed_deals()
    }

    pub fn balance(&self) -> Result<String> {
        self.runtime.block_on(self.client.balance())
    }

    pub fn payout(&self) -> Result<String> {
        self.runtime.block_on(self.client.payout())
    }

    pub fn get_candles(&self, asset: &str, period: u32, offset: i64) -> Result<String> {
        self.runtime
            .block_on(self.client.get_candles(asset, period, offset))
    }

    pub fn get_candles_advanced(&self, asset: &str, period: u32, offset: i64, time: i64) -> Result<String> {
        self.runtime
            .block_on(self.client.get_candles_advanced(asset, period, offset, time))
    }

    pub fn history(&self, asset: &str, period: u32) -> Result<String> {
        self.runtime.block_on(self.client.history(asset, period))
    }

    pub fn get_server_time(&self) -> i64 {
        self.client.get_server_time()
    }

    pub fn subscribe_symbol(&self, asset: &str) -> Result<BlockingSubscription> {
        let inner = self.runtime.block_on(self.client.subscribe_symbol(asset))?;
        Ok(self.wrap(inner))
    }

    pub fn subscribe_symbol_chunked(&self, asset: &str, chunk_size: NonZeroUsize) -> Result<BlockingSubscription> {
        let inner = self
            .runtime
            .block_on(self.client.subscribe_symbol_chunked(asset, chunk_size))?;
        Ok(self.wrap(inner))
    }

    pub fn subscribe_symbol_timed(&self, asset: &str, duration: Duration) -> Result<BlockingSubscription> {
        let inner = self
            .runtime
            .block_on(self.client.subscribe_symbol_timed(asset, duration))?;
        Ok(self.wrap(inner))
    }

    pub fn send_raw_message(&self, message: impl Into<String>) -> Result<()> {
        self.runtime.block_on(self.client.send_raw_message(message))
    }

    pub fn create_raw_order(&self, message: impl Into<String>, validator: Validator) -> Result<RawMessage> {
        self.runtime
            .block_on(self.client.create_raw_order(message, validator))
    }

    pub fn create_raw_order_with_timeout(
        &self,
        message: impl Into<String>,
        validator: Validator,
        timeout: Duration,
    ) -> Result<RawMessage> {
        self.runtime
            .block_on(self.client.create_raw_order_with_timeout(message, validator, timeout))
    }

    pub fn create_raw_order_with_timeout_and_retry(
        &self,
        message: impl Into<String>,
        validator: Validator,
        timeout: Duration,
    ) -> Result<RawMessage> {
        self.runtime.block_on(
            self.client
                .create_raw_order_with_timeout_and_retry(message, validator, timeout),
        )
    }

    pub fn create_raw_iterator(
        &self,
        message: impl Into<String>,
        validator: Validator,
        timeout: Option<Duration>,
    ) -> Result<BlockingSubscription> {
        let inner = self
            .runtime
            .block_on(self.client.create_raw_iterator(message, validator, timeout))?;
        Ok(self.wrap(inner))
    }

    fn wrap(&self, inner: Subscription) -> BlockingSubscription {
        BlockingSubscription {
            inner,
            runtime: self.runtime.clone(),
        }
    }
}

impl Drop for BlockingClient {
    fn drop(&mut self) {
        if Handle::try_current().is_err() {
            self.runtime.block_on(self.client.shutdown());
            return;
        }

        // block_on is refused on a thread that is driving a runtime
        debug!("Dropped inside a runtime, shutting down from a helper thread");
        let (client, runtime) = (&self.client, &self.runtime);
        thread::scope(|scope| {
            scope.spawn(|| runtime.block_on(client.shutdown()));
        });
    }
}

/// Sole owner of the runtime, shared by the client and its subscriptions
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        // A blocking runtime drop panics inside an async context
        if let Some(runtime) = self.0.take() {
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            }
        }
    }
}

#[derive(Clone)]
struct SharedRuntime {
    handle: Handle,
    _owner: Arc<OwnedRuntime>,
}

impl SharedRuntime {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

fn runtime() -> Result<SharedRuntime> {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("pocket-client")
        .build()
        .map_err(|e| Error::Runtime(e.to_string()))?;
    Ok(SharedRuntime {
        handle: runtime.handle().clone(),
        _owner: Arc::new(OwnedRuntime(Some(runtime))),
    })
}

/// Iterator over a subscription; each `next` blocks until an item arrives
/// or the stream ends
pub struct BlockingSubscription {
    inner: Subscription,
    runtime: SharedRuntime,
}

impl BlockingSubscription {
    pub fn unsubscribe(&mut self) {
        self.inner.unsubscribe();
    }
}

impl Iterator for BlockingSubscription {
    type Item = std::result::Result<StreamItem, GatewayError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.inner.next_item())
    }
}
