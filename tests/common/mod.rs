#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use dcabot::domain::bar::{BarInterval, PriceBar, TimeRange};
use dcabot::domain::error::DcabotError;
use dcabot::domain::rules::SignalSnapshot;
use dcabot::domain::trade::{OrderReceipt, Side, TradeEvent};
use dcabot::ports::alert_port::{AlertPort, Severity};
use dcabot::ports::fill_ledger_port::{open_tail, FillLedgerPort};
use dcabot::ports::market_data_port::MarketDataPort;
use dcabot::ports::order_port::OrderPort;
use dcabot::ports::quote_port::QuotePort;
use dcabot::ports::signal_port::SignalSource;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
}

pub fn make_bar(timestamp: DateTime<Utc>, close: f64) -> PriceBar {
    PriceBar {
        timestamp,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1_000.0,
    }
}

/// One hourly bar per close, starting at `base_time()`.
pub fn hourly_bars(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(base_time() + Duration::hours(i as i64), c))
        .collect()
}

/// Hourly sine wave around 100 with the given period in bars.
pub fn sine_bars(count: usize, period: f64, amplitude: f64) -> Vec<PriceBar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| 100.0 + amplitude * (i as f64 * std::f64::consts::TAU / period).sin())
        .collect();
    hourly_bars(&closes)
}

pub fn flat_bars(count: usize, price: f64) -> Vec<PriceBar> {
    hourly_bars(&vec![price; count])
}

pub fn range_for(bars: &[PriceBar]) -> TimeRange {
    let start = bars.first().map_or(base_time(), |b| b.timestamp);
    let end = bars.last().map_or(base_time(), |b| b.timestamp);
    TimeRange::new(start, end)
}

/// Historical bars by symbol; unknown symbols return an empty series.
pub struct MockMarketData {
    pub bars: BTreeMap<String, Vec<PriceBar>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            bars: BTreeMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }
}

impl MarketDataPort for MockMarketData {
    fn historical_bars(
        &self,
        symbol: &str,
        _interval: BarInterval,
        range: &TimeRange,
    ) -> Result<Vec<PriceBar>, DcabotError> {
        Ok(self
            .bars
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| range.contains(b.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Quote feed, bar history and order book in one: orders fill at the
/// current quote unless the symbol is on the rejection list.
pub struct MockVenue {
    prices: RefCell<BTreeMap<String, f64>>,
    history: BTreeMap<String, Vec<PriceBar>>,
    rejected: RefCell<BTreeSet<String>>,
    pub orders: RefCell<Vec<(String, Side, f64, f64)>>,
}

impl MockVenue {
    pub fn new() -> Self {
        Self {
            prices: RefCell::new(BTreeMap::new()),
            history: BTreeMap::new(),
            rejected: RefCell::new(BTreeSet::new()),
            orders: RefCell::new(Vec::new()),
        }
    }

    /// Quote plus a short flat history ending at `base_time()`.
    pub fn with_symbol(mut self, symbol: &str, price: f64) -> Self {
        let bars = (0..5)
            .map(|i| make_bar(base_time() - Duration::hours(4 - i), price))
            .collect();
        self.history.insert(symbol.to_string(), bars);
        self.prices.borrow_mut().insert(symbol.to_string(), price);
        self
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.borrow_mut().insert(symbol.to_string(), price);
    }

    pub fn remove_price(&self, symbol: &str) {
        self.prices.borrow_mut().remove(symbol);
    }

    pub fn reject_orders(&self, symbol: &str) {
        self.rejected.borrow_mut().insert(symbol.to_string());
    }

    pub fn accept_orders(&self, symbol: &str) {
        self.rejected.borrow_mut().remove(symbol);
    }

    pub fn order_count(&self) -> usize {
        self.orders.borrow().len()
    }
}

impl QuotePort for MockVenue {
    fn current_price(&self, symbol: &str) -> Result<f64, DcabotError> {
        self.prices
            .borrow()
            .get(symbol)
            .copied()
            .ok_or_else(|| DcabotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no quote".to_string(),
            })
    }
}

impl MarketDataPort for MockVenue {
    fn historical_bars(
        &self,
        symbol: &str,
        _interval: BarInterval,
        range: &TimeRange,
    ) -> Result<Vec<PriceBar>, DcabotError> {
        let bars = self
            .history
            .get(symbol)
            .ok_or_else(|| DcabotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no history".to_string(),
            })?;
        Ok(bars
            .iter()
            .filter(|b| range.contains(b.timestamp))
            .cloned()
            .collect())
    }
}

impl OrderPort for MockVenue {
    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> Result<OrderReceipt, DcabotError> {
        if self.rejected.borrow().contains(symbol) {
            return Err(DcabotError::OrderRejected {
                symbol: symbol.to_string(),
                reason: "insufficient balance".to_string(),
            });
        }
        let price = self.current_price(symbol)?;
        let mut orders = self.orders.borrow_mut();
        orders.push((symbol.to_string(), side, quantity, price));
        Ok(OrderReceipt {
            order_id: format!("mock-{}", orders.len()),
            quantity,
            price,
        })
    }
}

#[derive(Default)]
pub struct MockAlerts {
    pub messages: RefCell<Vec<(String, Severity)>>,
}

impl MockAlerts {
    pub fn count_at(&self, severity: Severity) -> usize {
        self.messages
            .borrow()
            .iter()
            .filter(|(_, s)| *s == severity)
            .count()
    }
}

impl AlertPort for MockAlerts {
    fn notify(&self, message: &str, severity: Severity) -> Result<(), DcabotError> {
        self.messages
            .borrow_mut()
            .push((message.to_string(), severity));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockLedger {
    pub events: RefCell<Vec<TradeEvent>>,
}

impl FillLedgerPort for MockLedger {
    fn record_fill(&self, event: &TradeEvent) -> Result<(), DcabotError> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }

    fn fills_since_last_exit(&self, symbol: &str) -> Result<Vec<TradeEvent>, DcabotError> {
        let fills = self
            .events
            .borrow()
            .iter()
            .filter(|e| e.symbol == symbol)
            .cloned()
            .collect();
        Ok(open_tail(fills))
    }
}

/// Signal source whose latest-bar snapshot is set by the test.
#[derive(Default)]
pub struct ScriptedSignals {
    latest: Cell<SignalSnapshot>,
}

impl ScriptedSignals {
    pub fn set(&self, buy: bool, sell: bool) {
        self.latest.set(SignalSnapshot { buy, sell });
    }

    pub fn quiet(&self) {
        self.set(false, false);
    }
}

impl SignalSource for ScriptedSignals {
    fn signals(&self, bars: &[PriceBar]) -> Result<Vec<SignalSnapshot>, DcabotError> {
        let mut out = vec![SignalSnapshot::default(); bars.len()];
        if let Some(last) = out.last_mut() {
            *last = self.latest.get();
        }
        Ok(out)
    }
}

/// Buy and sell on fixed bar indices.
pub struct IndexedSignals {
    pub buys: Vec<usize>,
    pub sells: Vec<usize>,
}

impl SignalSource for IndexedSignals {
    fn signals(&self, bars: &[PriceBar]) -> Result<Vec<SignalSnapshot>, DcabotError> {
        Ok((0..bars.len())
            .map(|i| SignalSnapshot {
                buy: self.buys.contains(&i),
                sell: self.sells.contains(&i),
            })
            .collect())
    }
}
