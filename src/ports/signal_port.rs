//! Port for strategies whose signals come from outside the crate.

use crate::domain::bar::PriceBar;
use crate::domain::error::DcabotError;
use crate::domain::rules::SignalSnapshot;

pub trait SignalSource {
    /// One snapshot per bar, aligned with `bars`.
    fn signals(&self, bars: &[PriceBar]) -> Result<Vec<SignalSnapshot>, DcabotError>;
}
