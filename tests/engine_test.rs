//! Position engine scenarios against mock ports.

mod common;

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, Utc};
use common::*;
use dcabot::domain::engine::{EngineConfig, EnginePorts, PositionEngine};
use dcabot::domain::position::PositionState;
use dcabot::domain::strategy::registry::StrategyRegistry;
use dcabot::domain::trade::{Side, TradeEvent, TransitionReason};
use dcabot::ports::alert_port::Severity;
use std::sync::Arc;

struct Harness {
    venue: MockVenue,
    alerts: MockAlerts,
    ledger: MockLedger,
    signals: Arc<ScriptedSignals>,
}

impl Harness {
    fn new(venue: MockVenue) -> Self {
        Harness {
            venue,
            alerts: MockAlerts::default(),
            ledger: MockLedger::default(),
            signals: Arc::new(ScriptedSignals::default()),
        }
    }

    fn engine(&self, config: EngineConfig) -> PositionEngine<'_> {
        let mut registry = StrategyRegistry::new();
        registry.register_external("scripted", self.signals.clone());
        let strategy = registry.build("scripted", None).unwrap();
        let ports = EnginePorts {
            quotes: &self.venue,
            bars: &self.venue,
            orders: &self.venue,
            alerts: &self.alerts,
            ledger: &self.ledger,
        };
        PositionEngine::new(config, strategy, ports)
    }
}

fn config_for(symbols: &[&str]) -> EngineConfig {
    EngineConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        ..EngineConfig::default()
    }
}

fn at(minutes: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minutes)
}

#[test]
fn flat_symbol_enters_on_buy_signal() {
    let h = Harness::new(MockVenue::new().with_symbol("BTC", 100.0));
    let mut engine = h.engine(config_for(&["BTC"]));

    let report = engine.tick(at(0));
    assert!(report.events.is_empty());
    assert_eq!(engine.state("BTC"), PositionState::Flat);

    h.signals.set(true, false);
    let report = engine.tick(at(1));
    assert_eq!(report.events.len(), 1);
    let entry = &report.events[0];
    assert_eq!(entry.reason, TransitionReason::Entry);
    assert_eq!(entry.side, Side::Buy);
    assert_relative_eq!(entry.quantity, 1.0);
    assert_eq!(entry.order_id.as_deref(), Some("mock-1"));

    assert_eq!(engine.state("BTC"), PositionState::Open);
    assert_eq!(h.ledger.events.borrow().len(), 1);
    assert_eq!(h.alerts.count_at(Severity::Info), 1);
}

#[test]
fn scale_in_recomputes_average_price() {
    let h = Harness::new(MockVenue::new().with_symbol("BTC", 100.0));
    let mut engine = h.engine(config_for(&["BTC"]));

    h.signals.set(true, false);
    engine.tick(at(0));
    h.signals.quiet();

    h.venue.set_price("BTC", 97.4);
    let report = engine.tick(at(1));
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].reason, TransitionReason::ScaleIn);
    assert_relative_eq!(report.events[0].quantity, 2.0);

    let pos = engine.position("BTC").unwrap();
    assert_relative_eq!(pos.quantity, 3.0);
    assert_relative_eq!(pos.average_entry_price, 98.266_666_666, epsilon = 1e-6);
    assert_eq!(pos.scale_in_count, 1);
}

#[test]
fn trailing_stop_arms_ratchets_and_exits() {
    let h = Harness::new(MockVenue::new().with_symbol("BTC", 100.0));
    let mut engine = h.engine(config_for(&["BTC"]));

    h.signals.set(true, false);
    engine.tick(at(0));
    h.signals.quiet();

    h.venue.set_price("BTC", 106.0);
    assert!(engine.tick(at(1)).events.is_empty());
    assert_eq!(engine.state("BTC"), PositionState::Trailing);
    let stop = engine.position("BTC").unwrap().trailing.unwrap();
    assert_relative_eq!(stop.stop_price, 105.47, epsilon = 1e-9);

    h.venue.set_price("BTC", 110.0);
    engine.tick(at(2));
    let stop = engine.position("BTC").unwrap().trailing.unwrap();
    assert_relative_eq!(stop.peak_price, 110.0);
    assert_relative_eq!(stop.stop_price, 109.45, epsilon = 1e-9);

    h.venue.set_price("BTC", 109.7);
    assert!(engine.tick(at(3)).events.is_empty());
    let stop = engine.position("BTC").unwrap().trailing.unwrap();
    assert_relative_eq!(stop.stop_price, 109.45, epsilon = 1e-9);

    h.venue.set_price("BTC", 109.0);
    let report = engine.tick(at(4));
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].reason, TransitionReason::TrailingExit);
    assert_eq!(report.events[0].side, Side::Sell);
    assert_relative_eq!(report.events[0].price, 109.0);
    assert_eq!(engine.state("BTC"), PositionState::Flat);
}

#[test]
fn sell_signal_closes_position() {
    let h = Harness::new(MockVenue::new().with_symbol("ETH", 10.0));
    let mut engine = h.engine(config_for(&["ETH"]));

    h.signals.set(true, false);
    engine.tick(at(0));
    h.signals.set(false, true);
    let report = engine.tick(at(1));

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].reason, TransitionReason::SignalExit);
    assert_relative_eq!(report.events[0].quantity, 10.0);
    assert!(engine.position("ETH").is_none());
}

#[test]
fn symbols_are_isolated() {
    let h = Harness::new(
        MockVenue::new()
            .with_symbol("BTC", 100.0)
            .with_symbol("ETH", 10.0),
    );
    let mut engine = h.engine(config_for(&["BTC", "ETH"]));

    h.signals.set(true, false);
    engine.tick(at(0));
    h.signals.quiet();
    assert_eq!(engine.state("BTC"), PositionState::Open);
    assert_eq!(engine.state("ETH"), PositionState::Open);

    h.venue.set_price("BTC", 97.0);
    let report = engine.tick(at(1));
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].symbol, "BTC");
    assert_eq!(engine.position("BTC").unwrap().scale_in_count, 1);
    assert_eq!(engine.position("ETH").unwrap().scale_in_count, 0);
    assert_relative_eq!(engine.position("ETH").unwrap().quantity, 10.0);
}

#[test]
fn missing_quote_skips_only_that_symbol() {
    let h = Harness::new(
        MockVenue::new()
            .with_symbol("BTC", 100.0)
            .with_symbol("ETH", 10.0),
    );
    let mut engine = h.engine(config_for(&["BTC", "ETH"]));
    h.venue.remove_price("BTC");

    h.signals.set(true, false);
    let report = engine.tick(at(0));

    assert_eq!(report.skipped, vec!["BTC".to_string()]);
    assert!(report.failures.is_empty());
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].symbol, "ETH");
    assert_eq!(engine.state("BTC"), PositionState::Flat);
}

#[test]
fn unknown_symbol_is_skipped() {
    let h = Harness::new(MockVenue::new().with_symbol("BTC", 100.0));
    let mut engine = h.engine(config_for(&["DOGE", "BTC"]));
    h.venue.set_price("DOGE", 0.1);

    h.signals.set(true, false);
    let report = engine.tick(at(0));
    assert_eq!(report.skipped, vec!["DOGE".to_string()]);
    assert_eq!(engine.state("BTC"), PositionState::Open);
}

#[test]
fn rejected_order_leaves_state_unchanged_and_alerts() {
    let h = Harness::new(MockVenue::new().with_symbol("BTC", 100.0));
    let mut engine = h.engine(config_for(&["BTC"]));

    h.signals.set(true, false);
    engine.tick(at(0));
    h.signals.quiet();

    h.venue.reject_orders("BTC");
    h.venue.set_price("BTC", 97.0);
    let report = engine.tick(at(1));

    assert!(report.events.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "BTC");
    assert_eq!(h.alerts.count_at(Severity::Error), 1);
    let pos = engine.position("BTC").unwrap();
    assert_relative_eq!(pos.quantity, 1.0);
    assert_eq!(pos.scale_in_count, 0);

    h.venue.accept_orders("BTC");
    let report = engine.tick(at(2));
    assert_eq!(report.events.len(), 1);
    assert_eq!(engine.position("BTC").unwrap().scale_in_count, 1);
}

#[test]
fn empty_levels_disable_scale_in() {
    let h = Harness::new(MockVenue::new().with_symbol("BTC", 100.0));
    let mut engine = h.engine(EngineConfig {
        scale_in_levels: Vec::new(),
        ..config_for(&["BTC"])
    });

    h.signals.set(true, false);
    engine.tick(at(0));
    h.signals.quiet();

    h.venue.set_price("BTC", 50.0);
    assert!(engine.tick(at(1)).events.is_empty());
    assert_eq!(engine.position("BTC").unwrap().scale_in_count, 0);
    assert_eq!(h.venue.order_count(), 1);
}

#[test]
fn scale_ins_rate_limited_per_window() {
    let h = Harness::new(MockVenue::new().with_symbol("BTC", 100.0));
    let mut engine = h.engine(EngineConfig {
        scale_in_levels: vec![-1.0, -2.0, -3.0, -4.0],
        max_scale_ins_per_window: 2,
        ..config_for(&["BTC"])
    });

    h.signals.set(true, false);
    engine.tick(at(0));
    h.signals.quiet();

    h.venue.set_price("BTC", 50.0);
    assert_eq!(engine.tick(at(1)).events.len(), 1);
    assert_eq!(engine.tick(at(2)).events.len(), 1);
    assert!(engine.tick(at(3)).events.is_empty());
    assert_eq!(engine.position("BTC").unwrap().scale_in_count, 2);

    // both earlier scale-ins have left the 24 hour window
    let report = engine.tick(at(25 * 60));
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].reason, TransitionReason::ScaleIn);
    assert_eq!(engine.position("BTC").unwrap().scale_in_count, 3);
}

#[test]
fn trailing_position_scales_in_and_returns_to_open() {
    let h = Harness::new(MockVenue::new().with_symbol("BTC", 100.0));
    let mut engine = h.engine(EngineConfig {
        trailing_gap_pct: 10.0,
        ..config_for(&["BTC"])
    });

    h.signals.set(true, false);
    engine.tick(at(0));
    h.signals.quiet();

    h.venue.set_price("BTC", 106.0);
    engine.tick(at(1));
    assert_eq!(engine.state("BTC"), PositionState::Trailing);
    let stop = engine.position("BTC").unwrap().trailing.unwrap();
    assert_relative_eq!(stop.stop_price, 95.4, epsilon = 1e-9);

    h.venue.set_price("BTC", 96.0);
    let report = engine.tick(at(2));
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].reason, TransitionReason::ScaleIn);
    assert_relative_eq!(report.events[0].quantity, 2.0);

    assert_eq!(engine.state("BTC"), PositionState::Open);
    let pos = engine.position("BTC").unwrap();
    assert_eq!(pos.scale_in_count, 1);
    assert_relative_eq!(pos.average_entry_price, (100.0 + 2.0 * 96.0) / 3.0, epsilon = 1e-9);
}

fn ledger_fill(
    symbol: &str,
    minutes: i64,
    side: Side,
    quantity: f64,
    price: f64,
    reason: TransitionReason,
) -> TradeEvent {
    TradeEvent {
        timestamp: at(minutes),
        symbol: symbol.to_string(),
        side,
        quantity,
        price,
        reason,
        order_id: None,
    }
}

#[test]
fn restore_rebuilds_open_positions_from_ledger() {
    let h = Harness::new(
        MockVenue::new()
            .with_symbol("BTC", 100.0)
            .with_symbol("ETH", 10.0),
    );
    h.ledger.events.borrow_mut().extend([
        ledger_fill("BTC", -30, Side::Buy, 1.0, 100.0, TransitionReason::Entry),
        ledger_fill("ETH", -25, Side::Buy, 10.0, 10.0, TransitionReason::Entry),
        ledger_fill("BTC", -20, Side::Buy, 2.0, 97.4, TransitionReason::ScaleIn),
        ledger_fill("ETH", -10, Side::Sell, 10.0, 11.0, TransitionReason::SignalExit),
    ]);
    let mut engine = h.engine(EngineConfig {
        max_scale_ins_per_window: 2,
        ..config_for(&["BTC", "ETH"])
    });

    assert_eq!(engine.restore().unwrap(), 1);
    assert_eq!(engine.state("BTC"), PositionState::Open);
    assert_eq!(engine.state("ETH"), PositionState::Flat);
    let pos = engine.position("BTC").unwrap();
    assert_relative_eq!(pos.quantity, 3.0);
    assert_relative_eq!(pos.average_entry_price, 98.266_666_666, epsilon = 1e-6);
    assert_eq!(pos.scale_in_count, 1);

    // the restored scale-in still counts toward the window
    h.venue.set_price("BTC", 50.0);
    let report = engine.tick(at(0));
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].reason, TransitionReason::ScaleIn);
    assert_relative_eq!(report.events[0].quantity, 6.0);
    assert!(engine.tick(at(1)).events.is_empty());
    assert_eq!(engine.position("BTC").unwrap().scale_in_count, 2);
}

#[test]
fn deepest_level_reused_after_ladder_exhausted() {
    let h = Harness::new(MockVenue::new().with_symbol("BTC", 100.0));
    let mut engine = h.engine(EngineConfig {
        scale_in_levels: vec![-1.0],
        max_scale_ins_per_window: 10,
        ..config_for(&["BTC"])
    });

    h.signals.set(true, false);
    engine.tick(at(0));
    h.signals.quiet();

    h.venue.set_price("BTC", 90.0);
    assert_eq!(engine.tick(at(1)).events.len(), 1);
    // average is now 93.33, and 92.9 is less than 1 % below it
    h.venue.set_price("BTC", 92.9);
    assert!(engine.tick(at(2)).events.is_empty());
    h.venue.set_price("BTC", 85.0);
    assert_eq!(engine.tick(at(3)).events.len(), 1);
    assert_eq!(engine.position("BTC").unwrap().scale_in_count, 2);
}
