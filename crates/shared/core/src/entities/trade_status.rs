use serde::{Deserialize, Serialize};

/// Trade lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    /// Trade has been accepted by the platform and is running
    Pending,
    /// Platform reported a profit for the trade
    Settled,
}

impl TradeStatus {
    /// Returns true if the trade is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Settled)
    }
}

/// Outcome of a settled trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeResult {
    Win,
    Loss,
    Draw,
}

impl TradeResult {
    /// Classify a reported profit: positive wins, zero draws, negative loses
    pub fn from_profit(profit: f64) -> Self {
        if profit > 0.0 {
            TradeResult::Win
        } else if profit < 0.0 {
            TradeResult::Loss
        } else {
            TradeResult::Draw
        }
    }
}
