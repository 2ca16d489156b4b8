//! Historical bar access port.

use crate::domain::bar::{BarInterval, PriceBar, TimeRange};
use crate::domain::error::DcabotError;

pub trait MarketDataPort {
    /// Bars inside `range`, ascending by timestamp.
    fn historical_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        range: &TimeRange,
    ) -> Result<Vec<PriceBar>, DcabotError>;
}
