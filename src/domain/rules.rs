//! Entry, scale-in and trailing-exit rules shared by the live engine and
//! the simulator.
//!
//! Each driver adapts its own position representation through [`Holding`]
//! and asks [`DecisionRules::decide`] what to do with the current price.

use serde::Serialize;

use super::position::{Position, TrailingStop};
use super::trade::TransitionReason;

/// What the rules need to know about an open position.
pub trait Holding {
    fn quantity(&self) -> f64;
    fn average_entry_price(&self) -> f64;
    fn scale_in_count(&self) -> u32;
    fn trailing(&self) -> Option<TrailingStop>;
}

impl Holding for Position {
    fn quantity(&self) -> f64 {
        self.quantity
    }

    fn average_entry_price(&self) -> f64 {
        self.average_entry_price
    }

    fn scale_in_count(&self) -> u32 {
        self.scale_in_count
    }

    fn trailing(&self) -> Option<TrailingStop> {
        self.trailing
    }
}

/// Strategy signals for the bar being acted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalSnapshot {
    pub buy: bool,
    pub sell: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Enter,
    ScaleIn { quantity: f64, level_pct: f64 },
    ActivateTrailing(TrailingStop),
    RatchetTrailing(TrailingStop),
    Exit(TransitionReason),
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleInRule {
    /// Ascending-depth loss thresholds in percent, e.g. `[-2.5, -5.0]`.
    pub levels: Vec<f64>,
    pub multiplier: f64,
    pub max_per_window: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingRule {
    pub start_pct_no_scale_in: f64,
    pub start_pct_with_scale_in: f64,
    pub gap_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionRules {
    pub scale_in: Option<ScaleInRule>,
    pub trailing: Option<TrailingRule>,
}

impl DecisionRules {
    /// Enter on buy, leave on sell; no scale-ins and no trailing stop.
    pub fn signal_only() -> Self {
        DecisionRules::default()
    }

    /// `recent_scale_ins` is the number of scale-ins inside the rate-limit window.
    pub fn decide<H: Holding>(
        &self,
        holding: Option<&H>,
        price: f64,
        signals: SignalSnapshot,
        recent_scale_ins: usize,
    ) -> Decision {
        let Some(holding) = holding else {
            return if signals.buy {
                Decision::Enter
            } else {
                Decision::Hold
            };
        };

        let trailing = holding.trailing();
        if trailing.is_some_and(|stop| stop.is_triggered(price)) {
            return Decision::Exit(TransitionReason::TrailingExit);
        }
        if signals.sell {
            return Decision::Exit(TransitionReason::SignalExit);
        }

        let Some(rule) = &self.trailing else {
            return self.scale_in_decision(holding, price, recent_scale_ins);
        };

        if let Some(stop) = trailing {
            // Not a new high; scale-ins still apply while above the stop.
            return match stop.ratchet(price, rule.gap_pct) {
                Some(raised) => Decision::RatchetTrailing(raised),
                None => self.scale_in_decision(holding, price, recent_scale_ins),
            };
        }

        let pnl_pct = pnl_pct(holding, price);
        let start = if holding.scale_in_count() == 0 {
            rule.start_pct_no_scale_in
        } else {
            rule.start_pct_with_scale_in
        };
        if pnl_pct >= start {
            return Decision::ActivateTrailing(TrailingStop::activate(price, rule.gap_pct));
        }

        self.scale_in_decision(holding, price, recent_scale_ins)
    }

    fn scale_in_decision<H: Holding>(
        &self,
        holding: &H,
        price: f64,
        recent_scale_ins: usize,
    ) -> Decision {
        let Some(rule) = &self.scale_in else {
            return Decision::Hold;
        };
        let Some(last) = rule.levels.len().checked_sub(1) else {
            return Decision::Hold;
        };
        if recent_scale_ins >= rule.max_per_window {
            return Decision::Hold;
        }

        let pnl_pct = pnl_pct(holding, price);
        let level_pct = rule.levels[(holding.scale_in_count() as usize).min(last)];
        if pnl_pct < 0.0 && pnl_pct <= level_pct {
            Decision::ScaleIn {
                quantity: holding.quantity() * rule.multiplier,
                level_pct,
            }
        } else {
            Decision::Hold
        }
    }
}

fn pnl_pct<H: Holding>(holding: &H, price: f64) -> f64 {
    let avg = holding.average_entry_price();
    (price - avg) / avg * 100.0
}
