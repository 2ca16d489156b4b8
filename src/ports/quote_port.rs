//! Live price feed port.

use crate::domain::error::DcabotError;

pub trait QuotePort {
    /// Best current price for `symbol`; `DataUnavailable` when there is none.
    fn current_price(&self, symbol: &str) -> Result<f64, DcabotError>;
}
