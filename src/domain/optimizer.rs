//! Genetic parameter search driven by the simulator.
//!
//! Bars are fetched once and lent to every evaluation. Each individual gets
//! a freshly built strategy value; survivors keep their cached fitness so a
//! generation only simulates its new children.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, info_span};

use super::bar::{validate_series, BarInterval, PriceBar, TimeRange};
use super::error::DcabotError;
use super::simulation::{replay, warmup_for, ForcedExitPolicy, SimulationConfig, SimulationResult};
use super::strategy::{ParamSet, StrategyRegistry};
use crate::ports::market_data_port::MarketDataPort;

/// Score for individuals that barely trade or cannot be simulated.
pub const DEGENERATE_FITNESS: f64 = -1e12;
/// Simulations with this many round trips or fewer are penalised.
pub const MIN_TRADES: usize = 5;
pub const SURVIVOR_FRACTION: f64 = 0.2;
pub const MUTATION_RATE: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub step: Option<f64>,
}

impl ParamRange {
    /// Uniform draw in `[min, max]`, snapped to `step` from `min`. Snapped
    /// values never pass the last grid point at or below `max`.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let raw = if self.max > self.min {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        };
        match self.step {
            Some(step) if step > 0.0 => {
                let snapped = self.min + ((raw - self.min) / step).round() * step;
                snapped.min(self.grid_max(step))
            }
            _ => raw,
        }
    }

    fn grid_max(&self, step: f64) -> f64 {
        let steps = ((self.max - self.min) / step + 1e-9).floor().max(0.0);
        self.min + steps * step
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub strategy_name: String,
    pub symbol: String,
    pub bar_interval: BarInterval,
    pub range: TimeRange,
    pub population_size: usize,
    pub generation_count: usize,
    pub parameter_space: BTreeMap<String, ParamRange>,
    pub initial_capital: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Individual {
    pub parameters: ParamSet,
    pub fitness: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub best_score: f64,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub strategy_name: String,
    pub best_parameters: ParamSet,
    pub best_score: f64,
    pub generations: Vec<GenerationStats>,
    pub best_simulation: Option<SimulationResult>,
}

/// Map a simulation outcome to a fitness score.
pub fn fitness(result: &SimulationResult) -> f64 {
    if result.total_trades <= MIN_TRADES {
        DEGENERATE_FITNESS
    } else {
        result.final_equity - result.initial_capital
    }
}

pub struct GeneticOptimizer<'a> {
    data: &'a dyn MarketDataPort,
    registry: &'a StrategyRegistry,
}

struct Best {
    parameters: ParamSet,
    score: f64,
    simulation: Option<SimulationResult>,
}

impl<'a> GeneticOptimizer<'a> {
    pub fn new(data: &'a dyn MarketDataPort, registry: &'a StrategyRegistry) -> Self {
        GeneticOptimizer { data, registry }
    }

    pub fn optimize(&self, config: &SearchConfig) -> Result<SearchResult, DcabotError> {
        self.check_config(config)?;

        let bars = self
            .data
            .historical_bars(&config.symbol, config.bar_interval, &config.range)?;
        let warmup = warmup_for(&self.registry.build(&config.strategy_name, None)?);
        if bars.len() <= warmup {
            return Err(DcabotError::InsufficientData {
                symbol: config.symbol.clone(),
                bars: bars.len(),
                minimum: warmup + 1,
            });
        }
        validate_series(&config.symbol, &bars)?;

        info!(
            strategy = %config.strategy_name,
            symbol = %config.symbol,
            bars = bars.len(),
            population = config.population_size,
            generations = config.generation_count,
            "starting parameter search"
        );

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut population: Vec<Individual> = (0..config.population_size)
            .map(|_| random_individual(&config.parameter_space, &mut rng))
            .collect();
        let mut best: Option<Best> = None;
        let mut generations = Vec::with_capacity(config.generation_count);

        for generation in 0..config.generation_count {
            let span = info_span!("generation", generation);
            let _guard = span.enter();

            for individual in population.iter_mut().filter(|i| i.fitness.is_none()) {
                let (score, simulation) = self.evaluate(config, &bars, &individual.parameters);
                individual.fitness = Some(score);
                if best.as_ref().is_none_or(|b| score > b.score) {
                    best = Some(Best {
                        parameters: individual.parameters.clone(),
                        score,
                        simulation,
                    });
                }
            }

            let scores: Vec<f64> = population
                .iter()
                .map(|i| i.fitness.unwrap_or(DEGENERATE_FITNESS))
                .collect();
            let stats = GenerationStats {
                generation,
                best_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                avg_score: scores.iter().sum::<f64>() / scores.len() as f64,
            };
            info!(best = stats.best_score, avg = stats.avg_score, "generation scored");
            generations.push(stats);

            if generation + 1 < config.generation_count {
                population = next_generation(population, &config.parameter_space, &mut rng);
            }
        }

        let best = best.ok_or_else(|| {
            DcabotError::config_invalid("search", "population_size", "no individuals evaluated")
        })?;

        Ok(SearchResult {
            strategy_name: config.strategy_name.clone(),
            best_parameters: best.parameters,
            best_score: best.score,
            generations,
            best_simulation: best.simulation,
        })
    }

    fn check_config(&self, config: &SearchConfig) -> Result<(), DcabotError> {
        if !self.registry.accepts_parameters(&config.strategy_name)? {
            return Err(DcabotError::UnsupportedStrategy {
                name: config.strategy_name.clone(),
            });
        }
        if config.population_size == 0 {
            return Err(DcabotError::config_invalid(
                "search",
                "population_size",
                "must be at least 1",
            ));
        }
        if config.generation_count == 0 {
            return Err(DcabotError::config_invalid(
                "search",
                "generation_count",
                "must be at least 1",
            ));
        }
        if config.parameter_space.is_empty() {
            return Err(DcabotError::config_invalid(
                "search",
                "parameters",
                "no [param.<name>] sections",
            ));
        }

        let known = self.registry.parameter_names(&config.strategy_name)?;
        for (name, range) in &config.parameter_space {
            let section = format!("param.{name}");
            if !known.contains(&name.as_str()) {
                return Err(DcabotError::config_invalid(
                    &section,
                    "name",
                    format!("{} has no parameter {name}", config.strategy_name),
                ));
            }
            if !(range.min.is_finite() && range.max.is_finite()) || range.min > range.max {
                return Err(DcabotError::config_invalid(
                    &section,
                    "min",
                    format!("bad range [{}, {}]", range.min, range.max),
                ));
            }
        }
        Ok(())
    }

    fn evaluate(
        &self,
        config: &SearchConfig,
        bars: &[PriceBar],
        parameters: &ParamSet,
    ) -> (f64, Option<SimulationResult>) {
        let sim_config = SimulationConfig {
            strategy_name: config.strategy_name.clone(),
            symbol: config.symbol.clone(),
            range: config.range,
            initial_capital: config.initial_capital,
            bar_interval: config.bar_interval,
            forced_exit_policy: ForcedExitPolicy::default(),
        };

        let outcome = self
            .registry
            .build(&config.strategy_name, Some(parameters))
            .and_then(|strategy| replay(&sim_config, &strategy, bars));

        match outcome {
            Ok(result) => (fitness(&result), Some(result)),
            Err(e) => {
                debug!(?parameters, error = %e, "individual penalised");
                (DEGENERATE_FITNESS, None)
            }
        }
    }
}

fn random_individual<R: Rng>(space: &BTreeMap<String, ParamRange>, rng: &mut R) -> Individual {
    Individual {
        parameters: space
            .iter()
            .map(|(name, range)| (name.clone(), range.sample(rng)))
            .collect(),
        fitness: None,
    }
}

/// Keep the fittest fifth unchanged and refill with mutated crossover children.
fn next_generation<R: Rng>(
    mut population: Vec<Individual>,
    space: &BTreeMap<String, ParamRange>,
    rng: &mut R,
) -> Vec<Individual> {
    let size = population.len();
    population.sort_by(|a, b| {
        let fa = a.fitness.unwrap_or(DEGENERATE_FITNESS);
        let fb = b.fitness.unwrap_or(DEGENERATE_FITNESS);
        fb.total_cmp(&fa)
    });

    let survivors = ((size as f64 * SURVIVOR_FRACTION) as usize).max(1);
    population.truncate(survivors);

    while population.len() < size {
        let a = &population[rng.gen_range(0..survivors)];
        let b = &population[rng.gen_range(0..survivors)];
        let mut parameters: ParamSet = a
            .parameters
            .iter()
            .map(|(name, &va)| {
                let vb = b.parameters.get(name).copied().unwrap_or(va);
                (name.clone(), if rng.gen_bool(0.5) { va } else { vb })
            })
            .collect();

        if rng.gen_bool(MUTATION_RATE) {
            let index = rng.gen_range(0..space.len());
            if let Some((name, range)) = space.iter().nth(index) {
                parameters.insert(name.clone(), range.sample(rng));
            }
        }

        population.push(Individual {
            parameters,
            fitness: None,
        });
    }

    population
}
