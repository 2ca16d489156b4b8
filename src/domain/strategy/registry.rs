//! Name-based strategy construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BandBreakout, External, Grid, MaCrossover, ParamSet, RsiThreshold, Strategy};
use crate::domain::error::DcabotError;
use crate::ports::signal_port::SignalSource;

pub const MA_CROSSOVER: &str = "ma_crossover";
pub const RSI_THRESHOLD: &str = "rsi_threshold";
pub const BAND_BREAKOUT: &str = "band_breakout";
pub const GRID: &str = "grid";

const BUILTIN: [&str; 4] = [MA_CROSSOVER, RSI_THRESHOLD, BAND_BREAKOUT, GRID];

/// Builds fresh [`Strategy`] values by name.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    external: BTreeMap<String, Arc<dyn SignalSource>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an outside signal source available under `name`.
    pub fn register_external(&mut self, name: &str, source: Arc<dyn SignalSource>) {
        self.external.insert(name.to_string(), source);
    }

    pub fn names(&self) -> Vec<String> {
        BUILTIN
            .iter()
            .map(|s| s.to_string())
            .chain(self.external.keys().cloned())
            .collect()
    }

    pub fn accepts_parameters(&self, name: &str) -> Result<bool, DcabotError> {
        if BUILTIN.contains(&name) {
            Ok(true)
        } else if self.external.contains_key(name) {
            Ok(false)
        } else {
            Err(DcabotError::UnknownStrategy {
                name: name.to_string(),
            })
        }
    }

    /// Parameter names a builtin strategy understands.
    pub fn parameter_names(&self, name: &str) -> Result<&'static [&'static str], DcabotError> {
        match name {
            MA_CROSSOVER => Ok(&MaCrossover::PARAMS),
            RSI_THRESHOLD => Ok(&RsiThreshold::PARAMS),
            BAND_BREAKOUT => Ok(&BandBreakout::PARAMS),
            GRID => Ok(&Grid::PARAMS),
            _ if self.external.contains_key(name) => Err(DcabotError::UnsupportedStrategy {
                name: name.to_string(),
            }),
            _ => Err(DcabotError::UnknownStrategy {
                name: name.to_string(),
            }),
        }
    }

    /// Construct a strategy. `None` means defaults; external strategies
    /// refuse any non-empty parameter set.
    pub fn build(&self, name: &str, params: Option<&ParamSet>) -> Result<Strategy, DcabotError> {
        let empty = ParamSet::new();
        let p = params.unwrap_or(&empty);
        match name {
            MA_CROSSOVER => MaCrossover::from_params(p).map(Strategy::MaCrossover),
            RSI_THRESHOLD => RsiThreshold::from_params(p).map(Strategy::RsiThreshold),
            BAND_BREAKOUT => BandBreakout::from_params(p).map(Strategy::BandBreakout),
            GRID => Grid::from_params(p).map(Strategy::Grid),
            _ => {
                let source = self.external.get(name).ok_or_else(|| {
                    DcabotError::UnknownStrategy {
                        name: name.to_string(),
                    }
                })?;
                if !p.is_empty() {
                    return Err(DcabotError::UnsupportedStrategy {
                        name: name.to_string(),
                    });
                }
                Ok(Strategy::External(External {
                    name: name.to_string(),
                    source: Arc::clone(source),
                }))
            }
        }
    }
}
