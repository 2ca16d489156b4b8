//! Order placement port.

use crate::domain::error::DcabotError;
use crate::domain::trade::{OrderReceipt, Side};

pub trait OrderPort {
    /// Place a market order. Errors are `OrderRejected` or `Venue`.
    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> Result<OrderReceipt, DcabotError>;
}
