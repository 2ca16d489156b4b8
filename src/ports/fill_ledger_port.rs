//! Trade history port: append-only writes, plus the read side used to
//! rebuild open positions on startup.

use crate::domain::error::DcabotError;
use crate::domain::trade::{Side, TradeEvent};

pub trait FillLedgerPort {
    fn record_fill(&self, event: &TradeEvent) -> Result<(), DcabotError>;

    /// Fills for `symbol` after its most recent sell, oldest first. Empty
    /// when the symbol is flat or the ledger keeps no readable history.
    fn fills_since_last_exit(&self, symbol: &str) -> Result<Vec<TradeEvent>, DcabotError>;
}

/// The tail of `fills` after the last sell.
pub fn open_tail(fills: Vec<TradeEvent>) -> Vec<TradeEvent> {
    let start = fills
        .iter()
        .rposition(|f| f.side == Side::Sell)
        .map_or(0, |i| i + 1);
    fills.into_iter().skip(start).collect()
}
