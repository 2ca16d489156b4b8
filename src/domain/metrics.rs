//! Performance statistics over simulated fills and equity curves.

use serde::Serialize;

use super::simulation::{EquityPoint, ForcedExitPolicy};
use super::trade::{Fill, Side};

/// Profit factor reported when there are gains but no losses.
pub const PROFIT_FACTOR_SENTINEL: f64 = 999.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    /// Completed buy/sell round trips, forced exits included.
    pub round_trips: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_fees: f64,
}

impl TradeStats {
    pub fn compute(fills: &[Fill], policy: ForcedExitPolicy) -> Self {
        let mut stats = TradeStats {
            total_fees: fills.iter().map(|f| f.fee).sum(),
            ..TradeStats::default()
        };
        let mut rated = 0usize;
        let mut rated_wins = 0usize;

        for fill in fills.iter().filter(|f| f.side == Side::Sell) {
            let pnl = fill.realized_pnl.unwrap_or(0.0);
            stats.round_trips += 1;

            if pnl > 0.0 {
                stats.wins += 1;
                stats.gross_profit += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
            } else if pnl < 0.0 {
                stats.losses += 1;
                stats.gross_loss += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
            }

            if fill.forced() && policy == ForcedExitPolicy::ExcludeFromWinRate {
                continue;
            }
            rated += 1;
            if pnl > 0.0 {
                rated_wins += 1;
            }
        }

        stats.win_rate = if rated > 0 {
            rated_wins as f64 / rated as f64 * 100.0
        } else {
            0.0
        };

        stats.profit_factor = if stats.gross_loss > 0.0 {
            stats.gross_profit / stats.gross_loss
        } else if stats.gross_profit > 0.0 {
            PROFIT_FACTOR_SENTINEL
        } else {
            0.0
        };

        if stats.wins > 0 {
            stats.avg_win = stats.gross_profit / stats.wins as f64;
        }
        if stats.losses > 0 {
            stats.avg_loss = stats.gross_loss / stats.losses as f64;
        }
        stats
    }
}

/// Largest percentage fall from a running peak.
pub fn max_drawdown_pct(curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;

    for point in curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak * 100.0);
        }
    }
    max_dd
}

/// Annualised Sharpe ratio of per-bar returns with a zero risk-free rate.
pub fn sharpe_ratio(curve: &[EquityPoint], periods_per_year: f64) -> f64 {
    if curve.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    if std > 0.0 {
        mean / std * periods_per_year.sqrt()
    } else {
        0.0
    }
}
