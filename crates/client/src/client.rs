//! `PocketClient` - the async facade over one authenticated session

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use pocket_clock::{Clock, SystemClock};
use pocket_core::config::parse_ws_url;
use pocket_core::{Config, Direction, RawMessage, Ssid, Trade, TradeId, Validator, commands, events};
use pocket_gateway::{
    ConnectionState, Connector, Session, Subscription, SubscriptionMode, WsConnector,
};
use pocket_ledger::{LedgerObserver, TradeLedger};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::state::SessionState;

/// Candle period used when subscribing to a symbol's tick stream
const STREAM_PERIOD: u32 = 1;

/// Builder for [`PocketClient`]
pub struct ClientBuilder {
    ssid: String,
    config: Option<Config>,
    url: Option<String>,
    connector: Option<Arc<dyn Connector>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ClientBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Connect to this endpoint only, ignoring the configured urls
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Transport to connect with (websocket by default)
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Clock used for trade expiry (system time by default)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub async fn connect(self) -> Result<PocketClient> {
        let ssid = Ssid::parse(&self.ssid)?;
        let config = self.config.unwrap_or_default();
        let urls = match &self.url {
            Some(raw) => vec![parse_ws_url(raw)?],
            None => config.resolve_urls(ssid.is_demo()),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new()));

        let ledger = Arc::new(TradeLedger::new(clock.clone(), config.extra_duration()));
        let state = Arc::new(SessionState::new());

        info!(
            "Connecting {} account (uid {}) via {} endpoint(s)",
            if ssid.is_demo() { "demo" } else { "real" },
            ssid.uid(),
            urls.len()
        );
        let session = Session::builder(connector, config)
            .urls(urls)
            .auth_frame(ssid.auth_frame())
            .observer(Arc::new(LedgerObserver::new(ledger.clone())))
            .observer(state.clone())
            .connect()
            .await?;

        Ok(PocketClient {
            ssid,
            session,
            ledger,
            state,
            clock,
        })
    }
}

/// Async client for one PocketOption account.
///
/// Structured payloads are returned as JSON text exactly as the platform
/// sent them; trades additionally carry `profit` and `result` once settled.
/// Decoding is left to the caller.
pub struct PocketClient {
    ssid: Ssid,
    session: Session,
    ledger: Arc<TradeLedger>,
    state: Arc<SessionState>,
    clock: Arc<dyn Clock>,
}

impl PocketClient {
    pub fn builder(ssid: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            ssid: ssid.into(),
            config: None,
            url: None,
            connector: None,
            clock: None,
        }
    }

    /// Connect with `config` (defaults when `None`) to the configured urls,
    /// or to the platform endpoints for the ssid's account type
    pub async fn new(ssid: impl Into<String>, config: Option<Config>) -> Result<Self> {
        Self::builder(ssid)
            .config(config.unwrap_or_default())
            .connect()
            .await
    }

    /// Connect to a single explicit endpoint
    pub async fn new_with_url(
        ssid: impl Into<String>,
        url: impl Into<String>,
        config: Option<Config>,
    ) -> Result<Self> {
        Self::builder(ssid)
            .config(config.unwrap_or_default())
            .url(url)
            .connect()
            .await
    }

    pub fn config(&self) -> &Config {
        self.session.config()
    }

    pub fn is_demo(&self) -> bool {
        self.ssid.is_demo()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    // ----- trading -----

    /// Open a call option; returns the deal id and the server's deal object
    pub async fn buy(&self, asset: &str, amount: f64, duration_secs: u32) -> Result<(TradeId, String)> {
        self.open_order(asset, amount, Direction::Call, duration_secs).await
    }

    /// Open a put option
    pub async fn sell(&self, asset: &str, amount: f64, duration_secs: u32) -> Result<(TradeId, String)> {
        self.open_order(asset, amount, Direction::Put, duration_secs).await
    }

    async fn open_order(
        &self,
        asset: &str,
        amount: f64,
        direction: Direction,
        duration_secs: u32,
    ) -> Result<(TradeId, String)> {
        let request_id = commands::request_id();
        let command = commands::open_order(asset, amount, direction, duration_secs, self.is_demo(), request_id);
        debug!("Placing {:?} {} on {} for {}s (request {})", direction, amount, asset, duration_secs, request_id);

        let reply = self
            .session
            .send_and_wait(command, order_reply(request_id), self.config().timeout())
            .await?;
        let event = reply
            .event()
            .ok_or_else(|| Error::UnexpectedResponse(reply.to_string()))?;

        if event.name == events::FAIL_OPEN_ORDER {
            return Err(Error::OrderRejected(event.payload.to_string()));
        }

        let trade = Trade::from_deal(&event.payload, self.clock.now())
            .ok_or_else(|| Error::UnexpectedResponse(event.payload.to_string()))?;
        let id = trade.id;
        info!("Opened {:?} {} on {}: trade {}", direction, amount, asset, id);

        // The ledger observer saw this frame before the reply resolved
        let trade = self.ledger.get(id).unwrap_or(trade);
        Ok((id, trade.to_json().to_string()))
    }

    /// Wait for a trade to settle; the returned deal has a `result` field
    pub async fn check_win(&self, id: TradeId) -> Result<String> {
        Ok(self.ledger.check_win(id).await?.to_json().to_string())
    }

    /// Expiry of a known trade as unix seconds
    pub fn get_deal_end_time(&self, id: TradeId) -> Option<i64> {
        self.ledger.end_time(id)
    }

    pub fn opened_deals(&self) -> String {
        deals_json(&self.ledger.opened())
    }

    pub fn closed_deals(&self) -> String {
        deals_json(&self.ledger.closed())
    }

    pub fn clear_closed_deals(&self) {
        let removed = self.ledger.clear_closed();
        debug!("Cleared {} closed deals", removed);
    }

    // ----- account and market data -----

    /// Latest balance payload, waiting up to `timeout` for the first push
    pub async fn balance(&self) -> Result<String> {
        self.state
            .wait_balance(self.config().timeout())
            .await
            .map(|balance| balance.to_string())
            .ok_or_else(|| Error::UnexpectedResponse("no balance received".to_string()))
    }

    /// Asset list with payouts, as pushed by the platform
    pub async fn payout(&self) -> Result<String> {
        self.state
            .wait_assets(self.config().timeout())
            .await
            .map(|assets| assets.to_string())
            .ok_or_else(|| Error::UnexpectedResponse("no asset list received".to_string()))
    }

    /// Candles ending at the current server time
    pub async fn get_candles(&self, asset: &str, period: u32, offset: i64) -> Result<String> {
        let time = self.get_server_time();
        self.get_candles_advanced(asset, period, offset, time).await
    }

    /// Candles ending at `time` (unix seconds)
    pub async fn get_candles_advanced(
        &self,
        asset: &str,
        period: u32,
        offset: i64,
        time: i64,
    ) -> Result<String> {
        let index = commands::history_index(time);
        let command = commands::load_history_period(asset, period, time, index, offset);
        let validator = Validator::all(vec![
            event_prefix(events::LOAD_HISTORY_PERIOD),
            Validator::contains(format!("\"index\":{}", index)),
        ]);

        let reply = self
            .session
            .send_and_wait_with_retry(command, validator, self.config().timeout())
            .await?;
        payload_field(&reply, "data")
    }

    /// Recent ticks for `asset` sent after switching the chart to it
    pub async fn history(&self, asset: &str, period: u32) -> Result<String> {
        let validator = Validator::all(vec![
            event_prefix(events::UPDATE_HISTORY_NEW_FAST),
            Validator::contains(format!("\"{}\"", asset)),
        ]);
        let reply = self
            .session
            .send_and_wait_with_retry(
                commands::change_symbol(asset, period),
                validator,
                self.config().timeout(),
            )
            .await?;
        payload_field(&reply, "history")
    }

    /// Server time in unix seconds: the latest tick time, or the local
    /// clock before any tick arrived
    pub fn get_server_time(&self) -> i64 {
        self.state
            .server_time()
            .unwrap_or_else(|| self.clock.now().timestamp())
    }

    // ----- streams -----

    pub async fn subscribe_symbol(&self, asset: &str) -> Result<Subscription> {
        self.subscribe_asset(asset, SubscriptionMode::Plain).await
    }

    /// Ticks delivered in batches of exactly `chunk_size`
    pub async fn subscribe_symbol_chunked(
        &self,
        asset: &str,
        chunk_size: NonZeroUsize,
    ) -> Result<Subscription> {
        self.subscribe_asset(asset, SubscriptionMode::Chunked(chunk_size))
            .await
    }

    /// Ticks for `duration`, then the stream ends
    pub async fn subscribe_symbol_timed(&self, asset: &str, duration: Duration) -> Result<Subscription> {
        self.subscribe_asset(asset, SubscriptionMode::Timed(duration))
            .await
    }

    async fn subscribe_asset(&self, asset: &str, mode: SubscriptionMode) -> Result<Subscription> {
        let filter = Validator::all(vec![
            event_prefix(events::UPDATE_STREAM),
            Validator::contains(format!("\"{}\"", asset)),
        ]);
        let command = commands::change_symbol(asset, STREAM_PERIOD);
        info!("Subscribing to {} ({:?})", asset, mode);
        Ok(self.session.subscribe(filter, mode, Some(command)).await?)
    }

    // ----- raw access -----

    pub async fn send_raw_message(&self, message: impl Into<String>) -> Result<()> {
        Ok(self.session.send(message).await?)
    }

    /// Send `message` and return the first inbound message `validator`
    /// accepts, within the configured timeout
    pub async fn create_raw_order(&self, message: impl Into<String>, validator: Validator) -> Result<RawMessage> {
        let timeout = self.config().timeout();
        self.create_raw_order_with_timeout(message, validator, timeout)
            .await
    }

    pub async fn create_raw_order_with_timeout(
        &self,
        message: impl Into<String>,
        validator: Validator,
        timeout: Duration,
    ) -> Result<RawMessage> {
        Ok(self.session.send_and_wait(message, validator, timeout).await?)
    }

    /// Like [`Self::create_raw_order_with_timeout`], resending up to
    /// `max_allowed_loops` times
    pub async fn create_raw_order_with_timeout_and_retry(
        &self,
        message: impl Into<String>,
        validator: Validator,
        timeout: Duration,
    ) -> Result<RawMessage> {
        Ok(self
            .session
            .send_and_wait_with_retry(message, validator, timeout)
            .await?)
    }

    /// Stream every inbound message `validator` accepts. `message` is sent
    /// now and again after each reconnect; with a `timeout` the stream ends
    /// once it elapses.
    pub async fn create_raw_iterator(
        &self,
        message: impl Into<String>,
        validator: Validator,
        timeout: Option<Duration>,
    ) -> Result<Subscription> {
        let mode = match timeout {
            Some(duration) => SubscriptionMode::Timed(duration),
            None => SubscriptionMode::Plain,
        };
        Ok(self
            .session
            .subscribe(validator, mode, Some(message.into()))
            .await?)
    }

    /// Close the connection; open streams end and pending calls fail
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }
}

/// Matches frames of one event, e.g. `42["successopenOrder",`
fn event_prefix(name: &str) -> Validator {
    Validator::starts_with(format!("42[\"{}\"", name))
}

/// Accepts the confirmation or rejection of one order request
fn order_reply(request_id: u64) -> Validator {
    let this_request = Validator::contains(format!("\"requestId\":{}", request_id));
    Validator::all(vec![
        Validator::any(vec![
            event_prefix(events::SUCCESS_OPEN_ORDER),
            event_prefix(events::FAIL_OPEN_ORDER),
        ]),
        this_request,
    ])
}

/// `payload[field]` when present, else the whole payload, as JSON text
fn payload_field(reply: &RawMessage, field: &str) -> Result<String> {
    let payload = reply
        .json()
        .ok_or_else(|| Error::UnexpectedResponse(reply.to_string()))?;
    Ok(match payload.get(field) {
        Some(value) => value.to_string(),
        None => payload.to_string(),
    })
}

fn deals_json(trades: &[Trade]) -> String {
    Value::Array(trades.iter().map(Trade::to_json).collect()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_reply_matches_only_its_request() {
        let validator = order_reply(42);
        assert!(validator.matches(r#"42["successopenOrder",{"id":"x","requestId":42}]"#));
        assert!(validator.matches(r#"42["failopenOrder",{"error":"low balance","requestId":42}]"#));
        assert!(!validator.matches(r#"42["successopenOrder",{"id":"x","requestId":43}]"#));
        assert!(!validator.matches(r#"42["updateStream",{"requestId":42}]"#));
    }

    #[test]
    fn test_payload_field() {
        let reply = RawMessage::from(r#"42["loadHistoryPeriod",{"index":1,"data":[1,2]}]"#);
        assert_eq!(payload_field(&reply, "data").unwrap(), "[1,2]");

        let reply = RawMessage::from(r#"42["updateHistoryNewFast",[[1,2]]]"#);
        assert_eq!(payload_field(&reply, "history").unwrap(), "[[1,2]]");
    }
}
