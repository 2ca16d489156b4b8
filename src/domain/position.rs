//! Live position tracking: averaging on scale-ins and the trailing stop.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-symbol lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionState {
    Flat,
    Open,
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailingStop {
    pub peak_price: f64,
    pub stop_price: f64,
}

impl TrailingStop {
    /// Arm the stop `gap_pct` percent below `price`.
    pub fn activate(price: f64, gap_pct: f64) -> Self {
        TrailingStop {
            peak_price: price,
            stop_price: price * (1.0 - gap_pct / 100.0),
        }
    }

    /// Follow a new high. Returns `None` when `price` is not above the peak.
    /// The stop is never lowered.
    pub fn ratchet(&self, price: f64, gap_pct: f64) -> Option<Self> {
        if price <= self.peak_price {
            return None;
        }
        Some(TrailingStop {
            peak_price: price,
            stop_price: self.stop_price.max(price * (1.0 - gap_pct / 100.0)),
        })
    }

    pub fn is_triggered(&self, price: f64) -> bool {
        price < self.stop_price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub average_entry_price: f64,
    /// Running sum of price * quantity over every fill.
    pub cost_basis: f64,
    pub scale_in_count: u32,
    pub trailing: Option<TrailingStop>,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn open(symbol: &str, quantity: f64, price: f64, opened_at: DateTime<Utc>) -> Self {
        Position {
            symbol: symbol.to_string(),
            quantity,
            average_entry_price: price,
            cost_basis: price * quantity,
            scale_in_count: 0,
            trailing: None,
            opened_at,
        }
    }

    /// Add a fill to the position. A scale-in drops any armed trailing stop,
    /// returning the position to `Open`.
    pub fn apply_scale_in(&mut self, price: f64, quantity: f64) {
        self.cost_basis += price * quantity;
        self.quantity += quantity;
        self.average_entry_price = self.cost_basis / self.quantity;
        self.scale_in_count += 1;
        self.trailing = None;
    }

    pub fn unrealized_pnl_pct(&self, price: f64) -> f64 {
        (price - self.average_entry_price) / self.average_entry_price * 100.0
    }

    pub fn state(&self) -> PositionState {
        if self.trailing.is_some() {
            PositionState::Trailing
        } else {
            PositionState::Open
        }
    }
}
