//! Live position engine.
//!
//! Holds at most one position per symbol and moves each symbol through
//! Flat -> Open -> Trailing -> Flat on every tick. Symbols are evaluated in
//! configured order; a failure on one symbol never touches another.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::{debug, error, info, info_span, warn};

use super::bar::{BarInterval, TimeRange};
use super::error::DcabotError;
use super::position::{Position, PositionState};
use super::rules::{Decision, DecisionRules, ScaleInRule, TrailingRule};
use super::strategy::Strategy;
use super::trade::{Side, TradeEvent, TransitionReason};
use crate::ports::alert_port::{AlertPort, Severity};
use crate::ports::fill_ledger_port::FillLedgerPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::order_port::OrderPort;
use crate::ports::quote_port::QuotePort;

/// Tracing target carrying one record per trade event.
pub const TRADE_LOG_TARGET: &str = "trade_log";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    pub bar_interval: BarInterval,
    /// Bars of history handed to the strategy each tick.
    pub history_bars: usize,
    /// Quote currency spent on an entry.
    pub entry_allocation: f64,
    pub scale_in_levels: Vec<f64>,
    pub scale_in_multiplier: f64,
    pub max_scale_ins_per_window: usize,
    pub window_hours: i64,
    pub trailing_start_pct_no_scale_in: f64,
    pub trailing_start_pct_with_scale_in: f64,
    pub trailing_gap_pct: f64,
    pub tick_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            symbols: Vec::new(),
            bar_interval: BarInterval::OneHour,
            history_bars: 100,
            entry_allocation: 100.0,
            scale_in_levels: vec![-2.5, -5.0, -10.0, -20.0, -30.0, -40.0, -50.0],
            scale_in_multiplier: 2.0,
            max_scale_ins_per_window: 2,
            window_hours: 24,
            trailing_start_pct_no_scale_in: 5.0,
            trailing_start_pct_with_scale_in: 2.5,
            trailing_gap_pct: 0.5,
            tick_seconds: 10,
        }
    }
}

impl From<&EngineConfig> for DecisionRules {
    fn from(config: &EngineConfig) -> Self {
        DecisionRules {
            scale_in: Some(ScaleInRule {
                levels: config.scale_in_levels.clone(),
                multiplier: config.scale_in_multiplier,
                max_per_window: config.max_scale_ins_per_window,
            }),
            trailing: Some(TrailingRule {
                start_pct_no_scale_in: config.trailing_start_pct_no_scale_in,
                start_pct_with_scale_in: config.trailing_start_pct_with_scale_in,
                gap_pct: config.trailing_gap_pct,
            }),
        }
    }
}

/// Collaborators the engine talks to.
#[derive(Clone, Copy)]
pub struct EnginePorts<'a> {
    pub quotes: &'a dyn QuotePort,
    pub bars: &'a dyn MarketDataPort,
    pub orders: &'a dyn OrderPort,
    pub alerts: &'a dyn AlertPort,
    pub ledger: &'a dyn FillLedgerPort,
}

#[derive(Debug, Clone, Default)]
struct SymbolBook {
    position: Option<Position>,
    /// Scale-in times inside the rate-limit window.
    scale_in_times: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFailure {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub events: Vec<TradeEvent>,
    /// Symbols skipped for lack of data.
    pub skipped: Vec<String>,
    pub failures: Vec<SymbolFailure>,
}

/// Replay the buys of an open trade: the first opens, the rest scale in.
fn rebuild_book(symbol: &str, fills: &[TradeEvent]) -> Option<SymbolBook> {
    let (first, rest) = fills.split_first()?;
    let mut position = Position::open(symbol, first.quantity, first.price, first.timestamp);
    let mut scale_in_times = Vec::with_capacity(rest.len());
    for fill in rest.iter().filter(|f| f.side == Side::Buy) {
        position.apply_scale_in(fill.price, fill.quantity);
        scale_in_times.push(fill.timestamp);
    }
    Some(SymbolBook {
        position: Some(position),
        scale_in_times,
    })
}

pub struct PositionEngine<'a> {
    config: EngineConfig,
    rules: DecisionRules,
    strategy: Strategy,
    ports: EnginePorts<'a>,
    books: BTreeMap<String, SymbolBook>,
}

impl<'a> PositionEngine<'a> {
    pub fn new(config: EngineConfig, strategy: Strategy, ports: EnginePorts<'a>) -> Self {
        let rules = DecisionRules::from(&config);
        PositionEngine {
            config,
            rules,
            strategy,
            ports,
            books: BTreeMap::new(),
        }
    }

    /// Rebuild open positions and their scale-in windows from the fill
    /// ledger. Returns how many symbols were restored. Trailing stops are
    /// not persisted and re-arm on the next qualifying tick.
    pub fn restore(&mut self) -> Result<usize, DcabotError> {
        let mut restored = 0;
        for symbol in &self.config.symbols {
            let fills = self.ports.ledger.fills_since_last_exit(symbol)?;
            let Some(book) = rebuild_book(symbol, &fills) else {
                continue;
            };
            if let Some(pos) = &book.position {
                info!(
                    symbol = %symbol,
                    quantity = pos.quantity,
                    average = pos.average_entry_price,
                    scale_ins = pos.scale_in_count,
                    "position restored"
                );
            }
            self.books.insert(symbol.clone(), book);
            restored += 1;
        }
        Ok(restored)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.books.get(symbol).and_then(|b| b.position.as_ref())
    }

    pub fn state(&self, symbol: &str) -> PositionState {
        self.position(symbol)
            .map(Position::state)
            .unwrap_or(PositionState::Flat)
    }

    /// Evaluate every configured symbol once.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let span = info_span!("tick", %now);
        let _guard = span.enter();

        let mut report = TickReport::default();
        let symbols = self.config.symbols.clone();

        for symbol in &symbols {
            match self.evaluate_symbol(symbol, now) {
                Ok(Some(event)) => {
                    self.publish(&event);
                    report.events.push(event);
                }
                Ok(None) => {}
                Err(
                    e @ (DcabotError::DataUnavailable { .. }
                    | DcabotError::InsufficientData { .. }
                    | DcabotError::InvalidData { .. }),
                ) => {
                    warn!(symbol = %symbol, error = %e, "skipping symbol this tick");
                    report.skipped.push(symbol.clone());
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "symbol evaluation failed");
                    self.alert(&format!("{symbol}: {e}"), Severity::Error);
                    report.failures.push(SymbolFailure {
                        symbol: symbol.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }

    fn evaluate_symbol(
        &mut self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>, DcabotError> {
        let price = self.ports.quotes.current_price(symbol)?;
        if !price.is_finite() || price <= 0.0 {
            return Err(DcabotError::InvalidData {
                symbol: symbol.to_string(),
                reason: format!("non-positive price {price}"),
            });
        }

        let range = TimeRange::trailing(now, self.config.bar_interval, self.config.history_bars);
        let bars = self
            .ports
            .bars
            .historical_bars(symbol, self.config.bar_interval, &range)?;
        if bars.is_empty() {
            return Err(DcabotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no bars in lookback window".into(),
            });
        }
        let signals = self.strategy.generate_signals(&bars)?.latest();

        let window_start = now - Duration::hours(self.config.window_hours);
        let book = self.books.entry(symbol.to_string()).or_default();
        book.scale_in_times.retain(|t| *t > window_start);

        let decision = self.rules.decide(
            book.position.as_ref(),
            price,
            signals,
            book.scale_in_times.len(),
        );
        debug!(symbol, price, ?signals, ?decision, "decision");

        let orders = self.ports.orders;
        let event = |side: Side,
                     quantity: f64,
                     price: f64,
                     reason: TransitionReason,
                     order_id: String| TradeEvent {
            timestamp: now,
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            reason,
            order_id: Some(order_id),
        };

        let Some(pos) = book.position.as_mut() else {
            if !matches!(decision, Decision::Enter) {
                return Ok(None);
            }
            let quantity = self.config.entry_allocation / price;
            let receipt = orders.place_order(symbol, Side::Buy, quantity)?;
            book.position = Some(Position::open(
                symbol,
                receipt.quantity,
                receipt.price,
                now,
            ));
            book.scale_in_times.clear();
            info!(symbol, price = receipt.price, quantity = receipt.quantity, "position opened");
            return Ok(Some(event(
                Side::Buy,
                receipt.quantity,
                receipt.price,
                TransitionReason::Entry,
                receipt.order_id,
            )));
        };

        match decision {
            Decision::ScaleIn {
                quantity,
                level_pct,
            } => {
                let receipt = orders.place_order(symbol, Side::Buy, quantity)?;
                pos.apply_scale_in(receipt.price, receipt.quantity);
                book.scale_in_times.push(now);
                info!(
                    symbol,
                    level_pct,
                    count = pos.scale_in_count,
                    average = pos.average_entry_price,
                    "scaled in"
                );
                Ok(Some(event(
                    Side::Buy,
                    receipt.quantity,
                    receipt.price,
                    TransitionReason::ScaleIn,
                    receipt.order_id,
                )))
            }
            Decision::ActivateTrailing(stop) => {
                info!(symbol, peak = stop.peak_price, stop = stop.stop_price, "trailing stop armed");
                pos.trailing = Some(stop);
                Ok(None)
            }
            Decision::RatchetTrailing(stop) => {
                debug!(symbol, peak = stop.peak_price, stop = stop.stop_price, "trailing stop raised");
                pos.trailing = Some(stop);
                Ok(None)
            }
            Decision::Exit(reason) => {
                let receipt = orders.place_order(symbol, Side::Sell, pos.quantity)?;
                let pnl_pct = pos.unrealized_pnl_pct(receipt.price);
                info!(symbol, %reason, pnl_pct, "position closed");
                book.position = None;
                Ok(Some(event(
                    Side::Sell,
                    receipt.quantity,
                    receipt.price,
                    reason,
                    receipt.order_id,
                )))
            }
            Decision::Enter | Decision::Hold => Ok(None),
        }
    }

    fn publish(&self, event: &TradeEvent) {
        info!(
            target: TRADE_LOG_TARGET,
            symbol = %event.symbol,
            side = %event.side,
            quantity = event.quantity,
            price = event.price,
            reason = %event.reason,
            order_id = event.order_id.as_deref().unwrap_or(""),
            "trade"
        );
        if let Err(e) = self.ports.ledger.record_fill(event) {
            error!(symbol = %event.symbol, error = %e, "failed to record fill");
        }
        self.alert(
            &format!(
                "{} {} {:.8} {} @ {:.8}",
                event.reason, event.side, event.quantity, event.symbol, event.price
            ),
            Severity::Info,
        );
    }

    fn alert(&self, message: &str, severity: Severity) {
        if let Err(e) = self.ports.alerts.notify(message, severity) {
            warn!(error = %e, "alert delivery failed");
        }
    }
}
