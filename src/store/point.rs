//! Latest known price for one symbol

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest known price data for a symbol
///
/// `None` means "not retrieved yet" or "could not be parsed", which is
/// distinct from a zero value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Last traded price
    pub last: Option<Decimal>,

    /// 24h change in percent (2.5 means +2.5%)
    pub change_pct_24h: Option<Decimal>,

    /// 24h volume in base currency
    pub volume_24h: Option<Decimal>,

    /// When the exchange produced this value
    pub updated_at: Option<DateTime<Utc>>,
}

impl PricePoint {
    /// The all-null point every symbol starts with
    pub const fn unknown() -> Self {
        Self {
            last: None,
            change_pct_24h: None,
            volume_24h: None,
            updated_at: None,
        }
    }

    /// Whether a last price is known
    pub fn is_known(&self) -> bool {
        self.last.is_some()
    }
}
