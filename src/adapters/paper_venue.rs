//! Paper trading venue.
//!
//! Replays stored bar series one timestamp at a time. Quotes are the close of
//! the latest bar at or before the replay clock and market orders fill there
//! immediately, so the position engine can run end to end without a broker.

use crate::adapters::csv_adapter::{read_bars, CsvAdapter};
use crate::domain::bar::{BarInterval, PriceBar, TimeRange};
use crate::domain::error::DcabotError;
use crate::domain::trade::{OrderReceipt, Side};
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::order_port::OrderPort;
use crate::ports::quote_port::QuotePort;
use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub symbol: String,
    pub side: Side,
    pub receipt: OrderReceipt,
    pub timestamp: DateTime<Utc>,
}

pub struct PaperVenue {
    series: BTreeMap<String, Vec<PriceBar>>,
    timeline: Vec<DateTime<Utc>>,
    cursor: Cell<Option<usize>>,
    orders: RefCell<Vec<PaperOrder>>,
}

impl PaperVenue {
    /// Series must be ascending; the replay timeline is the union of all bar
    /// timestamps.
    pub fn new(series: BTreeMap<String, Vec<PriceBar>>) -> Self {
        let timeline: BTreeSet<DateTime<Utc>> = series
            .values()
            .flat_map(|bars| bars.iter().map(|b| b.timestamp))
            .collect();
        PaperVenue {
            series,
            timeline: timeline.into_iter().collect(),
            cursor: Cell::new(None),
            orders: RefCell::new(Vec::new()),
        }
    }

    /// Load `<SYMBOL>_<interval>.csv` for every symbol.
    pub fn from_csv(
        adapter: &CsvAdapter,
        symbols: &[String],
        interval: BarInterval,
    ) -> Result<Self, DcabotError> {
        let mut series = BTreeMap::new();
        for symbol in symbols {
            let bars = read_bars(&adapter.csv_path(symbol, interval), symbol)?;
            series.insert(symbol.clone(), bars);
        }
        Ok(Self::new(series))
    }

    /// Step the replay clock to the next timestamp; `None` once exhausted.
    pub fn advance(&self) -> Option<DateTime<Utc>> {
        let next = self.cursor.get().map_or(0, |i| i + 1);
        let ts = *self.timeline.get(next)?;
        self.cursor.set(Some(next));
        Some(ts)
    }

    pub fn clock(&self) -> Option<DateTime<Utc>> {
        self.cursor.get().and_then(|i| self.timeline.get(i).copied())
    }

    pub fn remaining(&self) -> usize {
        let consumed = self.cursor.get().map_or(0, |i| i + 1);
        self.timeline.len().saturating_sub(consumed)
    }

    pub fn orders(&self) -> Vec<PaperOrder> {
        self.orders.borrow().clone()
    }

    fn visible_bars(&self, symbol: &str) -> Result<&[PriceBar], DcabotError> {
        let unavailable = |reason: &str| DcabotError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        };
        let clock = self.clock().ok_or_else(|| unavailable("replay has not started"))?;
        let bars = self
            .series
            .get(symbol)
            .ok_or_else(|| unavailable("symbol not loaded"))?;
        let visible = bars.partition_point(|b| b.timestamp <= clock);
        Ok(&bars[..visible])
    }
}

impl QuotePort for PaperVenue {
    fn current_price(&self, symbol: &str) -> Result<f64, DcabotError> {
        self.visible_bars(symbol)?
            .last()
            .map(|b| b.close)
            .ok_or_else(|| DcabotError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no bar at or before the replay clock".to_string(),
            })
    }
}

impl MarketDataPort for PaperVenue {
    fn historical_bars(
        &self,
        symbol: &str,
        _interval: BarInterval,
        range: &TimeRange,
    ) -> Result<Vec<PriceBar>, DcabotError> {
        Ok(self
            .visible_bars(symbol)?
            .iter()
            .filter(|b| range.contains(b.timestamp))
            .cloned()
            .collect())
    }
}

impl OrderPort for PaperVenue {
    fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> Result<OrderReceipt, DcabotError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(DcabotError::OrderRejected {
                symbol: symbol.to_string(),
                reason: format!("quantity {quantity} must be positive"),
            });
        }
        let price = self
            .current_price(symbol)
            .map_err(|e| DcabotError::OrderRejected {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;

        let mut orders = self.orders.borrow_mut();
        let receipt = OrderReceipt {
            order_id: format!("paper-{}", orders.len() + 1),
            quantity,
            price,
        };
        debug!(symbol, %side, quantity, price, order_id = %receipt.order_id, "paper fill");
        orders.push(PaperOrder {
            symbol: symbol.to_string(),
            side,
            receipt: receipt.clone(),
            timestamp: self.clock().unwrap_or_default(),
        });
        Ok(receipt)
    }
}
