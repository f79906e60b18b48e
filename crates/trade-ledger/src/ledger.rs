//! Trade records and check-win resolution
//!
//! The ledger is the single owner of trade records. Records enter as
//! `Pending` (order confirmation or opened-deals push) and become `Settled`
//! once the platform reports a profit. Settled records stay until
//! [`TradeLedger::clear_closed`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::RwLock;
use pocket_clock::Clock;
use pocket_core::{Trade, TradeId};
use serde_json::Value;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// How often `check_win` looks at the ledger
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Minimum wait when the expiry is unknown or already passed
pub const MIN_WAIT: Duration = Duration::from_secs(5);

pub struct TradeLedger {
    trades: RwLock<HashMap<TradeId, Trade>>,
    clock: Arc<dyn Clock>,
    extra_duration: Duration,
}

impl TradeLedger {
    pub fn new(clock: Arc<dyn Clock>, extra_duration: Duration) -> Self {
        Self {
            trades: RwLock::new(HashMap::new()),
            clock,
            extra_duration,
        }
    }

    /// Record a pending trade. A trade that is already known keeps its
    /// state; only its server details are refreshed while it is pending.
    pub fn submit(&self, trade: Trade) {
        let mut trades = self.trades.write();
        match trades.get_mut(&trade.id) {
            Some(existing) if existing.is_settled() => {}
            Some(existing) => {
                existing.close_time = trade.close_time.or(existing.close_time);
                if !trade.details.is_null() {
                    existing.details = trade.details;
                }
            }
            None => {
                debug!("Trade {} opened on {}", trade.id, trade.asset);
                trades.insert(trade.id, trade);
            }
        }
    }

    /// Settle a known trade with the reported profit
    pub fn settle(&self, id: TradeId, profit: f64, details: Value) -> Result<Trade> {
        let mut trades = self.trades.write();
        let trade = trades.get_mut(&id).ok_or(Error::UnknownTrade(id))?;
        if trade.is_settled() {
            return Ok(trade.clone());
        }
        trade.settle(profit, details);
        info!("Trade {} settled: profit={} result={:?}", id, profit, trade.result);
        Ok(trade.clone())
    }

    /// Record a pending trade from an opened-deal object; `None` when the
    /// deal has no id or asset
    pub fn record_opened(&self, deal: &Value) -> Option<TradeId> {
        let trade = Trade::from_deal(deal, self.clock.now())?;
        let id = trade.id;
        self.submit(trade);
        Some(id)
    }

    /// Settle from a closed-deal object, recording the trade first if this
    /// session never saw it open
    pub fn record_closed(&self, deal: &Value) -> Option<Trade> {
        let profit = deal.get("profit").and_then(Value::as_f64)?;
        let trade = Trade::from_deal(deal, self.clock.now())?;
        let id = trade.id;
        self.submit(trade);
        self.settle(id, profit, deal.clone()).ok()
    }

    pub fn get(&self, id: TradeId) -> Option<Trade> {
        self.trades.read().get(&id).cloned()
    }

    /// Expiry of a trade as unix seconds
    pub fn end_time(&self, id: TradeId) -> Option<i64> {
        self.trades
            .read()
            .get(&id)
            .and_then(|trade| trade.close_time)
            .map(|time| time.timestamp())
    }

    /// Pending trades, oldest first
    pub fn opened(&self) -> Vec<Trade> {
        self.collect(|trade| !trade.is_settled())
    }

    /// Settled trades, oldest first
    pub fn closed(&self) -> Vec<Trade> {
        self.collect(Trade::is_settled)
    }

    /// Drop settled trades; returns how many were removed
    pub fn clear_closed(&self) -> usize {
        let mut trades = self.trades.write();
        let before = trades.len();
        trades.retain(|_, trade| !trade.is_settled());
        before - trades.len()
    }

    pub fn len(&self) -> usize {
        self.trades.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.read().is_empty()
    }

    /// `max(remaining until expiry, 5 s) + extra_duration`
    pub fn wait_budget(&self, id: TradeId) -> Result<Duration> {
        let close_time = self
            .trades
            .read()
            .get(&id)
            .ok_or(Error::UnknownTrade(id))?
            .close_time;
        let remaining = close_time
            .and_then(|close| (close - self.clock.now()).to_std().ok())
            .unwrap_or(Duration::ZERO);
        Ok(remaining.max(MIN_WAIT) + self.extra_duration)
    }

    /// Wait until the trade is settled, polling every [`POLL_INTERVAL`]
    /// within its wait budget
    pub async fn check_win(&self, id: TradeId) -> Result<Trade> {
        let budget = self.wait_budget(id)?;
        let deadline = Instant::now() + budget;
        debug!("Waiting up to {:?} for trade {}", budget, id);

        loop {
            match self.get(id) {
                Some(trade) if trade.is_settled() => return Ok(trade),
                Some(_) => {}
                None => return Err(Error::UnknownTrade(id)),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("Trade {} still pending after {:?}", id, budget);
                return Err(Error::Timeout { id, waited: budget });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    fn collect(&self, keep: impl Fn(&Trade) -> bool) -> Vec<Trade> {
        let mut trades: Vec<Trade> = self
            .trades
            .read()
            .values()
            .filter(|trade| keep(trade))
            .cloned()
            .collect();
        trades.sort_by(|a, b| a.open_time.cmp(&b.open_time).then(a.id.cmp(&b.id)));
        trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use pocket_clock::{AnchoredClock, ManualClock};
    use pocket_core::{Direction, TradeResult};
    use uuid::Uuid;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn trade(close_in_secs: i64) -> Trade {
        Trade::new_with_time(
            Uuid::new_v4(),
            "EURUSD_otc",
            1.0,
            Direction::Call,
            start(),
            Some(start() + ChronoDuration::seconds(close_in_secs)),
        )
    }

    fn manual_ledger(extra_secs: u64) -> (TradeLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let ledger = TradeLedger::new(clock.clone(), Duration::from_secs(extra_secs));
        (ledger, clock)
    }

    #[test]
    fn test_settle_results_from_profit() {
        let (ledger, _) = manual_ledger(0);
        for (profit, expected) in [
            (10.0, TradeResult::Win),
            (0.0, TradeResult::Draw),
            (-5.0, TradeResult::Loss),
        ] {
            let t = trade(60);
            let id = t.id;
            ledger.submit(t);
            let settled = ledger.settle(id, profit, Value::Null).unwrap();
            assert_eq!(settled.result, Some(expected));
        }
        assert_eq!(ledger.closed().len(), 3);
    }

    #[test]
    fn test_settle_unknown_trade() {
        let (ledger, _) = manual_ledger(0);
        let id = Uuid::new_v4();
        assert_eq!(ledger.settle(id, 1.0, Value::Null), Err(Error::UnknownTrade(id)));
    }

    #[test]
    fn test_settled_trade_is_not_reopened() {
        let (ledger, _) = manual_ledger(0);
        let t = trade(60);
        let id = t.id;
        ledger.submit(t.clone());
        ledger.settle(id, 2.0, Value::Null).unwrap();

        ledger.submit(t);
        assert!(ledger.get(id).unwrap().is_settled());
        assert!(ledger.opened().is_empty());
    }

    #[test]
    fn test_clear_closed_keeps_pending() {
        let (ledger, _) = manual_ledger(0);
        let open = trade(60);
        let done = trade(30);
        let open_id = open.id;
        let done_id = done.id;
        ledger.submit(open);
        ledger.submit(done);
        ledger.settle(done_id, -1.0, Value::Null).unwrap();

        assert_eq!(ledger.clear_closed(), 1);
        assert!(ledger.get(done_id).is_none());
        assert_eq!(ledger.opened()[0].id, open_id);
        assert_eq!(ledger.end_time(open_id), Some(1_700_000_060));
    }

    #[test]
    fn test_deals_without_open_time_use_clock() {
        let (ledger, clock) = manual_ledger(0);
        clock.advance(ChronoDuration::seconds(42));
        let deal = serde_json::json!({
            "id": Uuid::new_v4().to_string(),
            "asset": "EURUSD_otc",
            "amount": 1,
        });

        let id = ledger.record_opened(&deal).unwrap();
        assert_eq!(ledger.get(id).unwrap().open_time, start() + ChronoDuration::seconds(42));

        let unseen = serde_json::json!({
            "id": Uuid::new_v4().to_string(),
            "asset": "GBPUSD",
            "profit": 1.2,
        });
        let settled = ledger.record_closed(&unseen).unwrap();
        assert_eq!(settled.open_time, start() + ChronoDuration::seconds(42));
        assert_eq!(settled.result, Some(TradeResult::Win));
    }

    #[test]
    fn test_wait_budget() {
        let (ledger, clock) = manual_ledger(5);
        let t = trade(60);
        let id = t.id;
        ledger.submit(t);

        assert_eq!(ledger.wait_budget(id).unwrap(), Duration::from_secs(65));

        clock.advance(ChronoDuration::seconds(58));
        assert_eq!(ledger.wait_budget(id).unwrap(), Duration::from_secs(10));

        clock.advance(ChronoDuration::seconds(12));
        assert_eq!(ledger.wait_budget(id).unwrap(), Duration::from_secs(10));

        let mut no_expiry = trade(0);
        no_expiry.close_time = None;
        let no_expiry_id = no_expiry.id;
        ledger.submit(no_expiry);
        assert_eq!(ledger.wait_budget(no_expiry_id).unwrap(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_win_times_out_on_expired_trade() {
        let _ = env_logger::try_init();
        let (ledger, clock) = manual_ledger(5);
        let t = trade(60);
        let id = t.id;
        ledger.submit(t);
        // expired 10 s ago
        clock.set(start() + ChronoDuration::seconds(70));

        let started = Instant::now();
        let err = ledger.check_win(id).await.unwrap_err();
        assert_eq!(
            err,
            Error::Timeout {
                id,
                waited: Duration::from_secs(10)
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_win_sees_settlement() {
        let _ = env_logger::try_init();
        let clock = Arc::new(AnchoredClock::new(Some(start())));
        let ledger = Arc::new(TradeLedger::new(clock, Duration::from_secs(5)));
        let t = trade(60);
        let id = t.id;
        ledger.submit(t);

        let settler = {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(61)).await;
                ledger.settle(id, 1.7, Value::Null).unwrap();
            })
        };

        let started = Instant::now();
        let trade = ledger.check_win(id).await.unwrap();
        assert_eq!(trade.result, Some(TradeResult::Win));
        assert_eq!(trade.to_json()["result"], "win");
        // picked up on the next poll after settlement
        assert!(started.elapsed() <= Duration::from_millis(61_500));
        settler.await.unwrap();
    }

    #[tokio::test]
    async fn test_check_win_unknown_trade() {
        let (ledger, _) = manual_ledger(0);
        let id = Uuid::new_v4();
        assert_eq!(ledger.check_win(id).await.unwrap_err(), Error::UnknownTrade(id));
    }
}
