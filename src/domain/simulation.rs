//! Historical replay of strategy signals.
//!
//! The simulator holds one binary flat/long position funded from a single
//! cash balance. Signals are computed once over the whole series, then bars
//! after the warm-up window are walked in time order. Given the same config,
//! strategy and bars, [`replay`] returns an identical result every time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::bar::{validate_series, BarInterval, PriceBar, TimeRange};
use super::error::DcabotError;
use super::metrics::{max_drawdown_pct, sharpe_ratio, TradeStats};
use super::position::TrailingStop;
use super::rules::{Decision, DecisionRules, Holding};
use super::strategy::Strategy;
use super::trade::{Fill, Side, TransitionReason};
use crate::ports::market_data_port::MarketDataPort;

pub const TAKER_FEE_RATE: f64 = 0.001;
/// Share of cash committed on entry; the rest absorbs rounding.
pub const BUY_FRACTION: f64 = 0.99;
pub const DEFAULT_WARMUP_BARS: usize = 50;

/// How end-of-series forced closes count toward the win rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedExitPolicy {
    #[default]
    Include,
    ExcludeFromWinRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub strategy_name: String,
    pub symbol: String,
    pub range: TimeRange,
    pub initial_capital: f64,
    pub bar_interval: BarInterval,
    pub forced_exit_policy: ForcedExitPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub strategy_name: String,
    pub symbol: String,
    pub initial_capital: f64,
    pub total_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub total_fees: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Fill>,
}

/// The simulator's long position, as seen by the decision rules.
struct SimHolding {
    quantity: f64,
    entry_price: f64,
    spend: f64,
}

impl Holding for SimHolding {
    fn quantity(&self) -> f64 {
        self.quantity
    }

    fn average_entry_price(&self) -> f64 {
        self.entry_price
    }

    fn scale_in_count(&self) -> u32 {
        0
    }

    fn trailing(&self) -> Option<TrailingStop> {
        None
    }
}

pub struct Simulator<'a> {
    data: &'a dyn MarketDataPort,
}

impl<'a> Simulator<'a> {
    pub fn new(data: &'a dyn MarketDataPort) -> Self {
        Simulator { data }
    }

    /// Fetch bars for the configured range and replay them.
    pub fn run(
        &self,
        config: &SimulationConfig,
        strategy: &Strategy,
    ) -> Result<SimulationResult, DcabotError> {
        let bars = self
            .data
            .historical_bars(&config.symbol, config.bar_interval, &config.range)?;
        info!(
            symbol = %config.symbol,
            strategy = strategy.name(),
            bars = bars.len(),
            "starting simulation"
        );
        replay(config, strategy, &bars)
    }
}

/// Warm-up window the simulator skips for `strategy`.
pub fn warmup_for(strategy: &Strategy) -> usize {
    strategy.warmup_bars().unwrap_or(DEFAULT_WARMUP_BARS)
}

fn sell_fill(
    bar: &PriceBar,
    held: &SimHolding,
    cash: &mut f64,
    reason: TransitionReason,
) -> Fill {
    let proceeds = held.quantity * bar.close;
    let fee = proceeds * TAKER_FEE_RATE;
    let net = proceeds - fee;
    *cash += net;
    Fill {
        timestamp: bar.timestamp,
        side: Side::Sell,
        price: bar.close,
        quantity: held.quantity,
        fee,
        realized_pnl: Some(net - held.spend),
        reason,
    }
}

/// Replay `bars` through `strategy` without touching any port.
pub fn replay(
    config: &SimulationConfig,
    strategy: &Strategy,
    bars: &[PriceBar],
) -> Result<SimulationResult, DcabotError> {
    let warmup = warmup_for(strategy);
    if bars.len() <= warmup {
        return Err(DcabotError::InsufficientData {
            symbol: config.symbol.clone(),
            bars: bars.len(),
            minimum: warmup + 1,
        });
    }
    validate_series(&config.symbol, bars)?;

    let signals = strategy.generate_signals(bars)?;
    let rules = DecisionRules::signal_only();

    let mut cash = config.initial_capital;
    let mut held: Option<SimHolding> = None;
    let mut trades = Vec::new();
    let mut equity_curve = Vec::with_capacity(bars.len() - warmup);

    for (i, bar) in bars.iter().enumerate().skip(warmup) {
        match rules.decide(held.as_ref(), bar.close, signals.snapshot(i), 0) {
            Decision::Enter => {
                let spend = BUY_FRACTION * cash;
                let fee = spend * TAKER_FEE_RATE;
                let quantity = (spend - fee) / bar.close;
                if quantity > 0.0 {
                    cash -= spend;
                    trades.push(Fill {
                        timestamp: bar.timestamp,
                        side: Side::Buy,
                        price: bar.close,
                        quantity,
                        fee,
                        realized_pnl: None,
                        reason: TransitionReason::Entry,
                    });
                    held = Some(SimHolding {
                        quantity,
                        entry_price: bar.close,
                        spend,
                    });
                }
            }
            Decision::Exit(reason) => {
                if let Some(h) = held.take() {
                    trades.push(sell_fill(bar, &h, &mut cash, reason));
                }
            }
            _ => {}
        }

        let position_value = held.as_ref().map_or(0.0, |h| h.quantity * bar.close);
        equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: cash + position_value,
        });
    }

    if let (Some(h), Some(last)) = (held.take(), bars.last()) {
        debug!(symbol = %config.symbol, at = %last.timestamp, "forcing close at series end");
        trades.push(sell_fill(last, &h, &mut cash, TransitionReason::ForcedExit));
    }

    let stats = TradeStats::compute(&trades, config.forced_exit_policy);
    let periods_per_year = chrono::Duration::days(365).num_seconds() as f64
        / config.bar_interval.duration().num_seconds() as f64;
    let total_return_pct = if config.initial_capital > 0.0 {
        (cash - config.initial_capital) / config.initial_capital * 100.0
    } else {
        0.0
    };

    Ok(SimulationResult {
        strategy_name: strategy.name().to_string(),
        symbol: config.symbol.clone(),
        initial_capital: config.initial_capital,
        total_trades: stats.round_trips,
        win_rate: stats.win_rate,
        profit_factor: stats.profit_factor,
        avg_win: stats.avg_win,
        avg_loss: stats.avg_loss,
        largest_win: stats.largest_win,
        largest_loss: stats.largest_loss,
        max_drawdown_pct: max_drawdown_pct(&equity_curve),
        sharpe_ratio: sharpe_ratio(&equity_curve, periods_per_year),
        total_fees: stats.total_fees,
        final_equity: cash,
        total_return_pct,
        equity_curve,
        trades,
    })
}
