//! Genetic parameter search end to end.

mod common;

use common::*;
use dcabot::domain::bar::{BarInterval, PriceBar};
use dcabot::domain::error::DcabotError;
use dcabot::domain::optimizer::{
    fitness, GeneticOptimizer, ParamRange, SearchConfig, DEGENERATE_FITNESS,
};
use dcabot::domain::simulation::{replay, ForcedExitPolicy, SimulationConfig};
use dcabot::domain::strategy::registry::{StrategyRegistry, MA_CROSSOVER};
use std::collections::BTreeMap;
use std::sync::Arc;

fn ma_space() -> BTreeMap<String, ParamRange> {
    let mut space = BTreeMap::new();
    space.insert(
        "fast_period".to_string(),
        ParamRange {
            min: 2.0,
            max: 6.0,
            step: Some(1.0),
        },
    );
    space.insert(
        "slow_period".to_string(),
        ParamRange {
            min: 10.0,
            max: 20.0,
            step: Some(2.0),
        },
    );
    space
}

fn search_config(strategy: &str, bars: &[PriceBar], seed: u64) -> SearchConfig {
    SearchConfig {
        strategy_name: strategy.to_string(),
        symbol: "BTC".to_string(),
        bar_interval: BarInterval::OneHour,
        range: range_for(bars),
        population_size: 8,
        generation_count: 4,
        parameter_space: ma_space(),
        initial_capital: 10_000.0,
        seed,
    }
}

#[test]
fn best_score_dominates_every_generation() {
    let bars = sine_bars(400, 40.0, 10.0);
    let data = MockMarketData::new().with_bars("BTC", bars.clone());
    let registry = StrategyRegistry::new();

    let result = GeneticOptimizer::new(&data, &registry)
        .optimize(&search_config(MA_CROSSOVER, &bars, 7))
        .unwrap();

    assert_eq!(result.generations.len(), 4);
    for generation in &result.generations {
        assert!(result.best_score >= generation.best_score);
        assert!(generation.best_score >= generation.avg_score);
    }
    let fast = result.best_parameters["fast_period"];
    let slow = result.best_parameters["slow_period"];
    assert!((2.0..=6.0).contains(&fast));
    assert!((10.0..=20.0).contains(&slow));
    let best = result.best_simulation.expect("best individual simulated");
    assert_eq!(fitness(&best), result.best_score);
}

#[test]
fn same_seed_same_result() {
    let bars = sine_bars(300, 30.0, 8.0);
    let data = MockMarketData::new().with_bars("BTC", bars.clone());
    let registry = StrategyRegistry::new();
    let optimizer = GeneticOptimizer::new(&data, &registry);

    let a = optimizer
        .optimize(&search_config(MA_CROSSOVER, &bars, 11))
        .unwrap();
    let b = optimizer
        .optimize(&search_config(MA_CROSSOVER, &bars, 11))
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn few_trades_are_penalised() {
    let closes: Vec<f64> = (0..200).map(|i| 100.0 + i as f64).collect();
    let bars = hourly_bars(&closes);
    let data = MockMarketData::new().with_bars("BTC", bars.clone());
    let registry = StrategyRegistry::new();

    let result = GeneticOptimizer::new(&data, &registry)
        .optimize(&search_config(MA_CROSSOVER, &bars, 3))
        .unwrap();
    assert_eq!(result.best_score, DEGENERATE_FITNESS);
}

#[test]
fn five_round_trips_still_degenerate() {
    let bars = flat_bars(80, 100.0);
    let mut registry = StrategyRegistry::new();
    registry.register_external(
        "five",
        Arc::new(IndexedSignals {
            buys: vec![51, 55, 59, 63, 67],
            sells: vec![53, 57, 61, 65, 69],
        }),
    );
    let config = SimulationConfig {
        strategy_name: "five".into(),
        symbol: "BTC".into(),
        range: range_for(&bars),
        initial_capital: 1_000.0,
        bar_interval: BarInterval::OneHour,
        forced_exit_policy: ForcedExitPolicy::Include,
    };
    let result = replay(&config, &registry.build("five", None).unwrap(), &bars).unwrap();

    assert_eq!(result.total_trades, 5);
    assert_eq!(fitness(&result), DEGENERATE_FITNESS);
}

#[test]
fn external_strategy_cannot_be_searched() {
    let bars = flat_bars(100, 100.0);
    let data = MockMarketData::new().with_bars("BTC", bars.clone());
    let mut registry = StrategyRegistry::new();
    registry.register_external(
        "signals",
        Arc::new(IndexedSignals {
            buys: vec![],
            sells: vec![],
        }),
    );

    let err = GeneticOptimizer::new(&data, &registry)
        .optimize(&search_config("signals", &bars, 1))
        .unwrap_err();
    assert!(matches!(err, DcabotError::UnsupportedStrategy { .. }));
}

#[test]
fn unknown_parameter_is_config_error() {
    let bars = sine_bars(200, 40.0, 10.0);
    let data = MockMarketData::new().with_bars("BTC", bars.clone());
    let registry = StrategyRegistry::new();
    let mut config = search_config(MA_CROSSOVER, &bars, 1);
    config.parameter_space.insert(
        "lookback".to_string(),
        ParamRange {
            min: 1.0,
            max: 2.0,
            step: None,
        },
    );

    let err = GeneticOptimizer::new(&data, &registry)
        .optimize(&config)
        .unwrap_err();
    assert!(matches!(err, DcabotError::ConfigInvalid { .. }));
}

#[test]
fn missing_series_is_insufficient_data() {
    let bars = sine_bars(200, 40.0, 10.0);
    let data = MockMarketData::new();
    let registry = StrategyRegistry::new();

    let err = GeneticOptimizer::new(&data, &registry)
        .optimize(&search_config(MA_CROSSOVER, &bars, 1))
        .unwrap_err();
    assert!(matches!(err, DcabotError::InsufficientData { bars: 0, .. }));
}

fn period_range(min: f64, max: f64) -> ParamRange {
    ParamRange {
        min,
        max,
        step: Some(1.0),
    }
}

#[test]
fn unbuildable_individuals_do_not_abort_the_search() {
    let bars = sine_bars(400, 40.0, 10.0);
    let data = MockMarketData::new().with_bars("BTC", bars.clone());
    let registry = StrategyRegistry::new();
    let mut config = search_config(MA_CROSSOVER, &bars, 5);
    config.parameter_space = BTreeMap::from([
        ("fast_period".to_string(), period_range(20.0, 30.0)),
        ("slow_period".to_string(), period_range(2.0, 10.0)),
    ]);

    let result = GeneticOptimizer::new(&data, &registry)
        .optimize(&config)
        .unwrap();

    assert_eq!(result.generations.len(), 4);
    for generation in &result.generations {
        assert_eq!(generation.best_score, DEGENERATE_FITNESS);
        assert_eq!(generation.avg_score, DEGENERATE_FITNESS);
    }
    assert_eq!(result.best_score, DEGENERATE_FITNESS);
    assert!(result.best_simulation.is_none());
}

#[test]
fn overlapping_space_mixes_valid_and_penalised_individuals() {
    let bars = sine_bars(400, 40.0, 10.0);
    let data = MockMarketData::new().with_bars("BTC", bars.clone());
    let registry = StrategyRegistry::new();
    let mut config = search_config(MA_CROSSOVER, &bars, 21);
    config.parameter_space = BTreeMap::from([
        ("fast_period".to_string(), period_range(2.0, 30.0)),
        ("slow_period".to_string(), period_range(2.0, 30.0)),
    ]);

    let result = GeneticOptimizer::new(&data, &registry)
        .optimize(&config)
        .unwrap();

    assert_eq!(result.generations.len(), 4);
    for generation in &result.generations {
        assert!(generation.avg_score >= DEGENERATE_FITNESS);
        assert!(generation.best_score >= generation.avg_score);
    }
    if result.best_score > DEGENERATE_FITNESS {
        assert!(result.best_parameters["fast_period"] < result.best_parameters["slow_period"]);
        assert!(result.best_simulation.is_some());
    }
}
