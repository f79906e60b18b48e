use chrono::{DateTime, Utc};

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Asset identifier as the platform names it (e.g. `EURUSD_otc`)
pub type Asset = String;

/// Amount in account currency
pub type Amount = f64;
