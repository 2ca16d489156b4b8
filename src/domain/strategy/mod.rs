//! Pluggable signal strategies.
//!
//! A [`Strategy`] is an immutable value: it turns a bar series into a
//! [`SignalFrame`] and keeps nothing between calls. Parameterisable variants
//! are rebuilt from a [`ParamSet`] through the registry.

pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::bar::PriceBar;
use crate::domain::error::DcabotError;
use crate::domain::indicator::bollinger::calculate_bollinger;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::IndicatorSeries;
use crate::domain::rules::SignalSnapshot;
use crate::ports::signal_port::SignalSource;

pub use registry::StrategyRegistry;

/// Named numeric parameters. Ordered so iteration is deterministic.
pub type ParamSet = BTreeMap<String, f64>;

/// Indicator columns plus per-bar buy/sell flags, aligned with the input bars.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalFrame {
    pub timestamps: Vec<chrono::DateTime<chrono::Utc>>,
    pub buy: Vec<bool>,
    pub sell: Vec<bool>,
    pub indicators: Vec<IndicatorSeries>,
}

impl SignalFrame {
    fn with_len(bars: &[PriceBar]) -> Self {
        SignalFrame {
            timestamps: bars.iter().map(|b| b.timestamp).collect(),
            buy: vec![false; bars.len()],
            sell: vec![false; bars.len()],
            indicators: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn snapshot(&self, index: usize) -> SignalSnapshot {
        SignalSnapshot {
            buy: self.buy.get(index).copied().unwrap_or(false),
            sell: self.sell.get(index).copied().unwrap_or(false),
        }
    }

    /// Signals on the most recent bar.
    pub fn latest(&self) -> SignalSnapshot {
        match self.len() {
            0 => SignalSnapshot::default(),
            n => self.snapshot(n - 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsiThreshold {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandBreakout {
    pub period: usize,
    pub std_mult: f64,
}

/// Buys a fixed percentage below a moving anchor and sells the same
/// distance above it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub anchor_period: usize,
    pub spacing_pct: f64,
}

/// Signals supplied by an outside source. Not parameterisable.
#[derive(Clone)]
pub struct External {
    pub name: String,
    pub source: Arc<dyn SignalSource>,
}

impl fmt::Debug for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("External").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub enum Strategy {
    MaCrossover(MaCrossover),
    RsiThreshold(RsiThreshold),
    BandBreakout(BandBreakout),
    Grid(Grid),
    External(External),
}

impl Default for MaCrossover {
    fn default() -> Self {
        MaCrossover {
            fast_period: 10,
            slow_period: 30,
        }
    }
}

impl Default for RsiThreshold {
    fn default() -> Self {
        RsiThreshold {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl Default for BandBreakout {
    fn default() -> Self {
        BandBreakout {
            period: 20,
            std_mult: 2.0,
        }
    }
}

impl Default for Grid {
    fn default() -> Self {
        Grid {
            anchor_period: 20,
            spacing_pct: 2.0,
        }
    }
}

fn degenerate(reason: impl Into<String>) -> DcabotError {
    DcabotError::DegenerateIndividual {
        reason: reason.into(),
    }
}

/// Read a period parameter, rounding to the nearest whole bar.
fn period_param(params: &ParamSet, key: &str, default: usize) -> Result<usize, DcabotError> {
    match params.get(key) {
        None => Ok(default),
        Some(v) if v.is_finite() && v.round() >= 1.0 => Ok(v.round() as usize),
        Some(v) => Err(degenerate(format!("{key} must be at least 1, got {v}"))),
    }
}

fn float_param(params: &ParamSet, key: &str, default: f64) -> Result<f64, DcabotError> {
    match params.get(key) {
        None => Ok(default),
        Some(v) if v.is_finite() => Ok(*v),
        Some(v) => Err(degenerate(format!("{key} must be finite, got {v}"))),
    }
}

fn reject_unknown(params: &ParamSet, known: &[&str]) -> Result<(), DcabotError> {
    match params.keys().find(|k| !known.contains(&k.as_str())) {
        Some(key) => Err(degenerate(format!("unknown parameter {key}"))),
        None => Ok(()),
    }
}

impl MaCrossover {
    pub const PARAMS: [&'static str; 2] = ["fast_period", "slow_period"];

    pub fn from_params(params: &ParamSet) -> Result<Self, DcabotError> {
        reject_unknown(params, &Self::PARAMS)?;
        let d = Self::default();
        let s = MaCrossover {
            fast_period: period_param(params, "fast_period", d.fast_period)?,
            slow_period: period_param(params, "slow_period", d.slow_period)?,
        };
        if s.fast_period >= s.slow_period {
            return Err(degenerate(format!(
                "fast_period {} must be below slow_period {}",
                s.fast_period, s.slow_period
            )));
        }
        Ok(s)
    }

    fn signals(&self, bars: &[PriceBar]) -> SignalFrame {
        let fast = calculate_sma(bars, self.fast_period);
        let slow = calculate_sma(bars, self.slow_period);
        let mut frame = SignalFrame::with_len(bars);

        for i in 1..bars.len() {
            let (Some(f0), Some(s0), Some(f1), Some(s1)) = (
                fast.simple_at(i - 1),
                slow.simple_at(i - 1),
                fast.simple_at(i),
                slow.simple_at(i),
            ) else {
                continue;
            };
            frame.buy[i] = f0 <= s0 && f1 > s1;
            frame.sell[i] = f0 >= s0 && f1 < s1;
        }

        frame.indicators = vec![fast, slow];
        frame
    }
}

impl RsiThreshold {
    pub const PARAMS: [&'static str; 3] = ["period", "oversold", "overbought"];

    pub fn from_params(params: &ParamSet) -> Result<Self, DcabotError> {
        reject_unknown(params, &Self::PARAMS)?;
        let d = Self::default();
        let s = RsiThreshold {
            period: period_param(params, "period", d.period)?,
            oversold: float_param(params, "oversold", d.oversold)?,
            overbought: float_param(params, "overbought", d.overbought)?,
        };
        if !(0.0..=100.0).contains(&s.oversold)
            || !(0.0..=100.0).contains(&s.overbought)
            || s.oversold >= s.overbought
        {
            return Err(degenerate(format!(
                "thresholds must satisfy 0 <= oversold ({}) < overbought ({}) <= 100",
                s.oversold, s.overbought
            )));
        }
        Ok(s)
    }

    fn signals(&self, bars: &[PriceBar]) -> SignalFrame {
        let rsi = calculate_rsi(bars, self.period);
        let mut frame = SignalFrame::with_len(bars);

        for i in 0..bars.len() {
            if let Some(value) = rsi.simple_at(i) {
                frame.buy[i] = value < self.oversold;
                frame.sell[i] = value > self.overbought;
            }
        }

        frame.indicators = vec![rsi];
        frame
    }
}

impl BandBreakout {
    pub const PARAMS: [&'static str; 2] = ["period", "std_mult"];

    pub fn from_params(params: &ParamSet) -> Result<Self, DcabotError> {
        reject_unknown(params, &Self::PARAMS)?;
        let d = Self::default();
        let s = BandBreakout {
            period: period_param(params, "period", d.period)?,
            std_mult: float_param(params, "std_mult", d.std_mult)?,
        };
        if s.period < 2 || s.std_mult <= 0.0 {
            return Err(degenerate(format!(
                "band needs period >= 2 and std_mult > 0, got {} and {}",
                s.period, s.std_mult
            )));
        }
        Ok(s)
    }

    /// Buy on a close above the upper band, sell on a close below the middle.
    fn signals(&self, bars: &[PriceBar]) -> SignalFrame {
        let mult_x100 = (self.std_mult * 100.0).round() as u32;
        let bands = calculate_bollinger(bars, self.period, mult_x100);
        let mut frame = SignalFrame::with_len(bars);

        for (i, bar) in bars.iter().enumerate() {
            if let Some((upper, middle, _)) = bands.bands_at(i) {
                frame.buy[i] = bar.close > upper;
                frame.sell[i] = bar.close < middle;
            }
        }

        frame.indicators = vec![bands];
        frame
    }
}

impl Grid {
    pub const PARAMS: [&'static str; 2] = ["anchor_period", "spacing_pct"];

    pub fn from_params(params: &ParamSet) -> Result<Self, DcabotError> {
        reject_unknown(params, &Self::PARAMS)?;
        let d = Self::default();
        let s = Grid {
            anchor_period: period_param(params, "anchor_period", d.anchor_period)?,
            spacing_pct: float_param(params, "spacing_pct", d.spacing_pct)?,
        };
        if s.spacing_pct <= 0.0 || s.spacing_pct >= 100.0 {
            return Err(degenerate(format!(
                "spacing_pct must be in (0, 100), got {}",
                s.spacing_pct
            )));
        }
        Ok(s)
    }

    fn signals(&self, bars: &[PriceBar]) -> SignalFrame {
        let anchor = calculate_sma(bars, self.anchor_period);
        let step = self.spacing_pct / 100.0;
        let mut frame = SignalFrame::with_len(bars);

        for (i, bar) in bars.iter().enumerate() {
            if let Some(mid) = anchor.simple_at(i) {
                frame.buy[i] = bar.close <= mid * (1.0 - step);
                frame.sell[i] = bar.close >= mid * (1.0 + step);
            }
        }

        frame.indicators = vec![anchor];
        frame
    }
}

impl Strategy {
    pub fn name(&self) -> &str {
        match self {
            Strategy::MaCrossover(_) => registry::MA_CROSSOVER,
            Strategy::RsiThreshold(_) => registry::RSI_THRESHOLD,
            Strategy::BandBreakout(_) => registry::BAND_BREAKOUT,
            Strategy::Grid(_) => registry::GRID,
            Strategy::External(ext) => &ext.name,
        }
    }

    pub fn generate_signals(&self, bars: &[PriceBar]) -> Result<SignalFrame, DcabotError> {
        match self {
            Strategy::MaCrossover(s) => Ok(s.signals(bars)),
            Strategy::RsiThreshold(s) => Ok(s.signals(bars)),
            Strategy::BandBreakout(s) => Ok(s.signals(bars)),
            Strategy::Grid(s) => Ok(s.signals(bars)),
            Strategy::External(ext) => {
                let snapshots = ext.source.signals(bars)?;
                if snapshots.len() != bars.len() {
                    return Err(DcabotError::InvalidData {
                        symbol: ext.name.clone(),
                        reason: format!(
                            "signal source returned {} rows for {} bars",
                            snapshots.len(),
                            bars.len()
                        ),
                    });
                }
                let mut frame = SignalFrame::with_len(bars);
                for (i, snap) in snapshots.iter().enumerate() {
                    frame.buy[i] = snap.buy;
                    frame.sell[i] = snap.sell;
                }
                Ok(frame)
            }
        }
    }

    /// Current parameter values, or `None` for strategies that take none.
    pub fn parameters(&self) -> Option<ParamSet> {
        let pairs: Vec<(&str, f64)> = match self {
            Strategy::MaCrossover(s) => vec![
                ("fast_period", s.fast_period as f64),
                ("slow_period", s.slow_period as f64),
            ],
            Strategy::RsiThreshold(s) => vec![
                ("period", s.period as f64),
                ("oversold", s.oversold),
                ("overbought", s.overbought),
            ],
            Strategy::BandBreakout(s) => {
                vec![("period", s.period as f64), ("std_mult", s.std_mult)]
            }
            Strategy::Grid(s) => vec![
                ("anchor_period", s.anchor_period as f64),
                ("spacing_pct", s.spacing_pct),
            ],
            Strategy::External(_) => return None,
        };
        Some(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// Bars the slowest indicator needs before its signals mean anything.
    pub fn warmup_bars(&self) -> Option<usize> {
        match self {
            Strategy::MaCrossover(s) => Some(s.slow_period),
            Strategy::RsiThreshold(s) => Some(s.period + 1),
            Strategy::BandBreakout(s) => Some(s.period),
            Strategy::Grid(s) => Some(s.anchor_period),
            Strategy::External(_) => None,
        }
    }
}
