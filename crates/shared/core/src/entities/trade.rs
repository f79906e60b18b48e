use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Direction, TradeResult, TradeStatus};
use crate::values::{Amount, Asset, Timestamp};

/// Unique identifier for a trade (deal id assigned by the platform)
pub type TradeId = Uuid;

/// A binary option position tracked from submission to settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub asset: Asset,
    pub amount: Amount,
    pub direction: Direction,
    /// When the platform opened the position
    pub open_time: Timestamp,
    /// Expiry of the position, if the platform reported one
    pub close_time: Option<Timestamp>,
    pub status: TradeStatus,
    /// Profit reported on settlement (None while pending)
    pub profit: Option<f64>,
    pub result: Option<TradeResult>,
    /// Raw deal object as last reported by the server
    pub details: Value,
}

impl Trade {
    /// Create a pending trade with explicit times
    pub fn new_with_time(
        id: TradeId,
        asset: impl Into<Asset>,
        amount: Amount,
        direction: Direction,
        open_time: Timestamp,
        close_time: Option<Timestamp>,
    ) -> Self {
        Self {
            id,
            asset: asset.into(),
            amount,
            direction,
            open_time,
            close_time,
            status: TradeStatus::Pending,
            profit: None,
            result: None,
            details: Value::Null,
        }
    }

    /// Build a pending trade from a server deal object.
    ///
    /// Deals carry `id`, `asset`, `amount`, `command` (0 = call, 1 = put)
    /// and unix-second `openTimestamp` / `closeTimestamp` fields. A deal
    /// without `openTimestamp` opens at `received_at`. Returns `None` when
    /// the id or asset is missing.
    pub fn from_deal(deal: &Value, received_at: Timestamp) -> Option<Self> {
        let id = deal.get("id")?.as_str().and_then(|s| Uuid::parse_str(s).ok())?;
        let asset = deal.get("asset")?.as_str()?.to_string();
        let amount = deal.get("amount").and_then(Value::as_f64).unwrap_or_default();
        let direction = deal
            .get("command")
            .and_then(Value::as_i64)
            .and_then(Direction::from_command)
            .unwrap_or(Direction::Call);
        let open_time = deal
            .get("openTimestamp")
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or(received_at);
        let close_time = deal
            .get("closeTimestamp")
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));

        let mut trade = Self::new_with_time(id, asset, amount, direction, open_time, close_time);
        trade.details = deal.clone();
        Some(trade)
    }

    /// Mark the trade settled with the reported profit
    pub fn settle(&mut self, profit: f64, details: Value) {
        self.status = TradeStatus::Settled;
        self.profit = Some(profit);
        self.result = Some(TradeResult::from_profit(profit));
        if !details.is_null() {
            self.details = details;
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }

    /// Raw JSON handed across the client boundary: the server deal object,
    /// plus `profit` and `result` once settled.
    pub fn to_json(&self) -> Value {
        let command = match self.direction {
            Direction::Call => 0,
            Direction::Put => 1,
        };
        let mut value = match &self.details {
            Value::Object(map) => Value::Object(map.clone()),
            _ => serde_json::json!({
                "id": self.id.to_string(),
                "asset": self.asset,
                "amount": self.amount,
                "command": command,
                "openTimestamp": self.open_time.timestamp(),
                "closeTimestamp": self.close_time.map(|t| t.timestamp()),
            }),
        };
        if let (Some(profit), Some(result), Value::Object(map)) =
            (self.profit, self.result, &mut value)
        {
            map.insert("profit".to_string(), Value::from(profit));
            map.insert(
                "result".to_string(),
                serde_json::to_value(result).unwrap_or(Value::Null),
            );
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deal() -> Value {
        json!({
            "id": "6f1c2d3e-4b5a-4c6d-8e7f-8091a2b3c4d5",
            "asset": "EURUSD_otc",
            "amount": 1.5,
            "command": 1,
            "openTimestamp": 1_700_000_000,
            "closeTimestamp": 1_700_000_060,
            "profit": 0
        })
    }

    fn received() -> Timestamp {
        DateTime::from_timestamp(1_800_000_000, 0).unwrap()
    }

    #[test]
    fn test_from_deal() {
        let trade = Trade::from_deal(&deal(), received()).unwrap();
        assert_eq!(trade.asset, "EURUSD_otc");
        assert_eq!(trade.direction, Direction::Put);
        assert_eq!(trade.amount, 1.5);
        assert_eq!(trade.status, TradeStatus::Pending);
        assert!(trade.profit.is_none());
        assert_eq!(trade.open_time.timestamp(), 1_700_000_000);
        assert_eq!(trade.close_time.unwrap().timestamp(), 1_700_000_060);
    }

    #[test]
    fn test_from_deal_without_open_time() {
        let mut deal = deal();
        deal.as_object_mut().unwrap().remove("openTimestamp");
        let trade = Trade::from_deal(&deal, received()).unwrap();
        assert_eq!(trade.open_time, received());
    }

    #[test]
    fn test_from_deal_requires_id() {
        assert!(Trade::from_deal(&json!({"asset": "EURUSD_otc"}), received()).is_none());
    }

    #[test]
    fn test_settle_and_json() {
        let mut trade = Trade::from_deal(&deal(), received()).unwrap();
        trade.settle(-1.5, Value::Null);
        assert!(trade.is_settled());
        assert_eq!(trade.result, Some(TradeResult::Loss));

        let json = trade.to_json();
        assert_eq!(json["result"], "loss");
        assert_eq!(json["profit"], -1.5);
        assert_eq!(json["asset"], "EURUSD_otc");
    }
}
