mod direction;
mod trade;
mod trade_status;

pub use direction::Direction;
pub use trade::{Trade, TradeId};
pub use trade_status::{TradeResult, TradeStatus};
