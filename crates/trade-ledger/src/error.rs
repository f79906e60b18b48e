//! Trade Ledger errors

use std::time::Duration;

use pocket_core::TradeId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown trade: {0}")]
    UnknownTrade(TradeId),

    #[error("Trade {id} not settled after waiting {waited:?}")]
    Timeout { id: TradeId, waited: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
