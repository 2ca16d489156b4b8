//! Trade events, fills and order receipts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// Why a position changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Entry,
    ScaleIn,
    TrailingExit,
    SignalExit,
    /// Closed at the end of a simulated series.
    ForcedExit,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReason::Entry => "entry",
            TransitionReason::ScaleIn => "scale_in",
            TransitionReason::TrailingExit => "trailing_exit",
            TransitionReason::SignalExit => "signal_exit",
            TransitionReason::ForcedExit => "forced_exit",
        }
    }

    pub fn side(&self) -> Side {
        match self {
            TransitionReason::Entry | TransitionReason::ScaleIn => Side::Buy,
            _ => Side::Sell,
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quantity-moving transition of a live position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub reason: TransitionReason,
    pub order_id: Option<String>,
}

/// A simulated fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub fee: f64,
    /// Net proceeds minus spend; present on sells only.
    pub realized_pnl: Option<f64>,
    pub reason: TransitionReason,
}

impl Fill {
    pub fn forced(&self) -> bool {
        self.reason == TransitionReason::ForcedExit
    }

    pub fn is_win(&self) -> bool {
        self.realized_pnl.is_some_and(|pnl| pnl > 0.0)
    }
}

/// Venue acknowledgement of a filled market order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub order_id: String,
    pub quantity: f64,
    pub price: f64,
}
