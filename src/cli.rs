//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::csv_adapter::{CsvAdapter, CsvSignalSource};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::{write_equity_csv, JsonReportAdapter};
use crate::adapters::log_adapter::{TracingAlerts, TracingLedger};
use crate::adapters::paper_venue::PaperVenue;
use crate::domain::bar::BarInterval;
use crate::domain::config_validation::{
    parse_forced_exit_policy, parse_interval, parse_levels, parse_range, parse_symbols, require,
    validate_engine_config, validate_search_config, validate_simulation_config,
    PARAM_SECTION_PREFIX,
};
use crate::domain::engine::{EngineConfig, EnginePorts, PositionEngine};
use crate::domain::error::DcabotError;
use crate::domain::optimizer::{GeneticOptimizer, ParamRange, SearchConfig, SearchResult};
use crate::domain::position::PositionState;
use crate::domain::simulation::{SimulationConfig, SimulationResult, Simulator};
use crate::domain::strategy::registry::{StrategyRegistry, MA_CROSSOVER};
use crate::domain::strategy::ParamSet;
use crate::ports::config_port::ConfigPort;
use crate::ports::fill_ledger_port::FillLedgerPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;

/// Name external signals are registered under.
pub const EXTERNAL_STRATEGY: &str = "external";

#[derive(Parser, Debug)]
#[command(
    name = "dcabot",
    about = "DCA position engine, strategy simulator and parameter search"
)]
pub struct Cli {
    /// Log filter, e.g. `info` or `dcabot=debug,trade_log=info`
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    /// `text` or `json`
    #[arg(long, global = true, default_value = "text")]
    pub log_format: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay one strategy over historical bars
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the full result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        equity_csv: Option<PathBuf>,
    },
    /// Genetic search over strategy parameters
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Equity curve of the best individual
        #[arg(long)]
        equity_csv: Option<PathBuf>,
    },
    /// Run the position engine against the paper venue
    Live {
        #[arg(short, long)]
        config: PathBuf,
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<usize>,
    },
    /// Validate every section present in a config file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols with CSV data for an interval
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, default_value = "1hour")]
        interval: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Simulate {
            config,
            output,
            equity_csv,
        } => run_simulate(&config, output.as_ref(), equity_csv.as_ref()),
        Command::Optimize {
            config,
            output,
            equity_csv,
        } => run_optimize(&config, output.as_ref(), equity_csv.as_ref()),
        Command::Live { config, ticks } => run_live(&config, ticks),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config, interval } => run_list_symbols(&config, &interval),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = DcabotError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(e: DcabotError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, DcabotError> {
    let d = EngineConfig::default();
    Ok(EngineConfig {
        symbols: parse_symbols(config),
        bar_interval: parse_interval(config, "engine")?,
        history_bars: config.get_int("engine", "history_bars", d.history_bars as i64) as usize,
        entry_allocation: config.get_double("engine", "entry_allocation", d.entry_allocation),
        scale_in_levels: parse_levels(config)?,
        scale_in_multiplier: config.get_double(
            "engine",
            "scale_in_multiplier",
            d.scale_in_multiplier,
        ),
        max_scale_ins_per_window: config.get_int(
            "engine",
            "max_scale_ins_per_window",
            d.max_scale_ins_per_window as i64,
        ) as usize,
        window_hours: config.get_int("engine", "window_hours", d.window_hours),
        trailing_start_pct_no_scale_in: config.get_double(
            "engine",
            "trailing_start_pct_no_scale_in",
            d.trailing_start_pct_no_scale_in,
        ),
        trailing_start_pct_with_scale_in: config.get_double(
            "engine",
            "trailing_start_pct_with_scale_in",
            d.trailing_start_pct_with_scale_in,
        ),
        trailing_gap_pct: config.get_double("engine", "trailing_gap_pct", d.trailing_gap_pct),
        tick_seconds: config.get_int("engine", "tick_seconds", d.tick_seconds as i64) as u64,
    })
}

pub fn build_simulation_config(config: &dyn ConfigPort) -> Result<SimulationConfig, DcabotError> {
    Ok(SimulationConfig {
        strategy_name: require(config, "simulation", "strategy")?,
        symbol: require(config, "simulation", "symbol")?.to_uppercase(),
        range: parse_range(config, "simulation")?,
        initial_capital: config.get_double("simulation", "initial_capital", 10_000.0),
        bar_interval: parse_interval(config, "simulation")?,
        forced_exit_policy: parse_forced_exit_policy(config)?,
    })
}

pub fn build_search_config(config: &dyn ConfigPort) -> Result<SearchConfig, DcabotError> {
    let mut parameter_space = BTreeMap::new();
    for section in config.sections() {
        let Some(name) = section.strip_prefix(PARAM_SECTION_PREFIX) else {
            continue;
        };
        let bound = |key: &str| -> Result<f64, DcabotError> {
            let raw = require(config, &section, key)?;
            raw.parse()
                .map_err(|_| DcabotError::config_invalid(&section, key, format!("'{raw}' is not a number")))
        };
        let step = match config.get_string(&section, "step") {
            Some(_) => Some(config.get_double(&section, "step", 0.0)),
            None => None,
        };
        parameter_space.insert(
            name.to_string(),
            ParamRange {
                min: bound("min")?,
                max: bound("max")?,
                step,
            },
        );
    }

    Ok(SearchConfig {
        strategy_name: require(config, "search", "strategy")?,
        symbol: require(config, "search", "symbol")?.to_uppercase(),
        bar_interval: parse_interval(config, "search")?,
        range: parse_range(config, "search")?,
        population_size: config.get_int("search", "population_size", 20) as usize,
        generation_count: config.get_int("search", "generation_count", 10) as usize,
        parameter_space,
        initial_capital: config.get_double("search", "initial_capital", 10_000.0),
        seed: config.get_int("search", "seed", 42) as u64,
    })
}

/// Parameter overrides from `[strategy]`; `None` when the section is empty.
pub fn build_strategy_params(config: &dyn ConfigPort) -> Result<Option<ParamSet>, DcabotError> {
    let mut params = ParamSet::new();
    for key in config.keys("strategy") {
        let raw = config.get_string("strategy", &key).unwrap_or_default();
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| DcabotError::config_invalid("strategy", &key, format!("'{raw}' is not a number")))?;
        params.insert(key, value);
    }
    Ok(if params.is_empty() { None } else { Some(params) })
}

/// Builtin strategies plus the CSV signal source from `[external]`, if any.
pub fn build_registry(config: &dyn ConfigPort) -> Result<StrategyRegistry, DcabotError> {
    let mut registry = StrategyRegistry::new();
    if let Some(path) = config.get_string("external", "signals_csv") {
        let source = CsvSignalSource::from_file(std::path::Path::new(path.trim()))?;
        registry.register_external(EXTERNAL_STRATEGY, Arc::new(source));
    }
    Ok(registry)
}

fn csv_dir(config: &dyn ConfigPort) -> Result<PathBuf, DcabotError> {
    require(config, "data", "csv_dir").map(PathBuf::from)
}

/// Historical bar source selected by `[data] source`.
pub fn open_market_data(config: &dyn ConfigPort) -> Result<Box<dyn MarketDataPort>, DcabotError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string())
        .trim()
        .to_lowercase();
    match source.as_str() {
        "csv" => Ok(Box::new(CsvAdapter::new(csv_dir(config)?))),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let adapter = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            Ok(Box::new(adapter))
        }
        other => Err(DcabotError::config_invalid(
            "data",
            "source",
            format!("unsupported data source '{other}'"),
        )),
    }
}

/// SQLite fill ledger when `[sqlite] path` is set, log-only otherwise.
#[cfg_attr(not(feature = "sqlite"), allow(unused_variables))]
pub fn open_ledger(config: &dyn ConfigPort) -> Result<Box<dyn FillLedgerPort>, DcabotError> {
    #[cfg(feature = "sqlite")]
    {
        if config.get_string("sqlite", "path").is_some() {
            let adapter = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            return Ok(Box::new(adapter));
        }
    }
    Ok(Box::new(TracingLedger))
}

fn path_str(path: &PathBuf) -> Result<&str, DcabotError> {
    path.to_str().ok_or_else(|| {
        DcabotError::Io(std::io::Error::other(format!(
            "path {} is not valid UTF-8",
            path.display()
        )))
    })
}

fn run_simulate(
    config_path: &PathBuf,
    output_path: Option<&PathBuf>,
    equity_path: Option<&PathBuf>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_simulation_config(&adapter) {
        return fail(e);
    }

    let prepared = build_simulation_config(&adapter).and_then(|sim_config| {
        let registry = build_registry(&adapter)?;
        let params = build_strategy_params(&adapter)?;
        let strategy = registry.build(&sim_config.strategy_name, params.as_ref())?;
        Ok((sim_config, strategy))
    });
    let (sim_config, strategy) = match prepared {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let data_port = match open_market_data(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Simulating {} on {} ({} to {})",
        sim_config.strategy_name, sim_config.symbol, sim_config.range.start, sim_config.range.end
    );
    let result = match Simulator::new(data_port.as_ref()).run(&sim_config, &strategy) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    print_simulation_summary(&result);

    if let Err(e) = write_outputs(
        output_path,
        equity_path,
        |path| JsonReportAdapter::new().write_simulation(&result, path),
        Some(&result),
    ) {
        return fail(e);
    }
    ExitCode::SUCCESS
}

fn write_outputs(
    output_path: Option<&PathBuf>,
    equity_path: Option<&PathBuf>,
    write_report: impl FnOnce(&str) -> Result<(), DcabotError>,
    simulation: Option<&SimulationResult>,
) -> Result<(), DcabotError> {
    if let Some(path) = output_path {
        write_report(path_str(path)?)?;
        eprintln!("\nReport written to: {}", path.display());
    }
    if let (Some(path), Some(result)) = (equity_path, simulation) {
        write_equity_csv(&result.equity_curve, path_str(path)?)?;
        eprintln!("Equity curve written to: {}", path.display());
    }
    Ok(())
}

pub fn print_simulation_summary(result: &SimulationResult) {
    eprintln!("\n=== Simulation Results ===");
    eprintln!("Strategy:         {}", result.strategy_name);
    eprintln!("Symbol:           {}", result.symbol);
    eprintln!("Total Return:     {:.2}%", result.total_return_pct);
    eprintln!("Final Equity:     {:.2}", result.final_equity);
    eprintln!("Sharpe Ratio:     {:.2}", result.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", result.max_drawdown_pct);
    eprintln!("Total Trades:     {}", result.total_trades);
    eprintln!("Win Rate:         {:.1}%", result.win_rate);
    eprintln!("Profit Factor:    {:.2}", result.profit_factor);
    eprintln!("Avg Win:          {:.2}", result.avg_win);
    eprintln!("Avg Loss:         {:.2}", result.avg_loss);
    eprintln!("Largest Win:      {:.2}", result.largest_win);
    eprintln!("Largest Loss:     {:.2}", result.largest_loss);
    eprintln!("Fees Paid:        {:.2}", result.total_fees);
}

fn print_search_summary(result: &SearchResult) {
    eprintln!("\n=== Search Results ===");
    for g in &result.generations {
        eprintln!(
            "  generation {:>3}:  best {:>12.4}  avg {:>12.4}",
            g.generation, g.best_score, g.avg_score
        );
    }
    eprintln!("\nBest Score:       {:.4}", result.best_score);
    eprintln!("Best Parameters:");
    for (name, value) in &result.best_parameters {
        eprintln!("  {name} = {value}");
    }
    if let Some(sim) = &result.best_simulation {
        print_simulation_summary(sim);
    }
}

fn run_optimize(
    config_path: &PathBuf,
    output_path: Option<&PathBuf>,
    equity_path: Option<&PathBuf>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_search_config(&adapter) {
        return fail(e);
    }

    let prepared = build_search_config(&adapter)
        .and_then(|search| Ok((search, build_registry(&adapter)?)));
    let (search_config, registry) = match prepared {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let data_port = match open_market_data(&adapter) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };

    eprintln!(
        "Searching {} on {}: population {}, {} generations, seed {}",
        search_config.strategy_name,
        search_config.symbol,
        search_config.population_size,
        search_config.generation_count,
        search_config.seed
    );
    let optimizer = GeneticOptimizer::new(data_port.as_ref(), &registry);
    let result = match optimizer.optimize(&search_config) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    print_search_summary(&result);

    if let Err(e) = write_outputs(
        output_path,
        equity_path,
        |path| JsonReportAdapter::new().write_search(&result, path),
        result.best_simulation.as_ref(),
    ) {
        return fail(e);
    }
    ExitCode::SUCCESS
}

fn run_live(config_path: &PathBuf, ticks: Option<usize>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_engine_config(&adapter) {
        return fail(e);
    }

    let prepared = build_engine_config(&adapter).and_then(|engine_config| {
        let registry = build_registry(&adapter)?;
        let name = adapter
            .get_string("engine", "strategy")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| MA_CROSSOVER.to_string());
        let params = build_strategy_params(&adapter)?;
        let strategy = registry.build(&name, params.as_ref())?;
        let csv = CsvAdapter::new(csv_dir(&adapter)?);
        let venue = PaperVenue::from_csv(&csv, &engine_config.symbols, engine_config.bar_interval)?;
        let ledger = open_ledger(&adapter)?;
        Ok((engine_config, strategy, venue, ledger))
    });
    let (engine_config, strategy, venue, ledger) = match prepared {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return fail(DcabotError::Io(e)),
    };

    let alerts = TracingAlerts;
    let ports = EnginePorts {
        quotes: &venue,
        bars: &venue,
        orders: &venue,
        alerts: &alerts,
        ledger: ledger.as_ref(),
    };
    let symbols = engine_config.symbols.clone();
    let tick_period = Duration::from_secs(engine_config.tick_seconds.max(1));
    let mut engine = PositionEngine::new(engine_config, strategy, ports);
    match engine.restore() {
        Ok(0) => {}
        Ok(n) => eprintln!("Restored {n} open position(s) from the fill ledger"),
        Err(e) => return fail(e),
    }

    eprintln!(
        "Paper trading {} symbol(s), {} replay steps",
        symbols.len(),
        venue.remaining()
    );

    let completed = runtime.block_on(async {
        let mut interval = tokio::time::interval(tick_period);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut completed = 0usize;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = &mut ctrl_c => {
                    info!("interrupted, stopping after {completed} ticks");
                    break;
                }
            }
            let Some(now) = venue.advance() else {
                info!("replay exhausted");
                break;
            };
            let report = engine.tick(now);
            for failure in &report.failures {
                warn!(symbol = %failure.symbol, reason = %failure.reason, "symbol failed this tick");
            }
            completed += 1;
            if ticks.is_some_and(|limit| completed >= limit) {
                break;
            }
        }
        completed
    });

    eprintln!("\n=== Paper Session ===");
    eprintln!("Ticks:            {completed}");
    eprintln!("Orders:           {}", venue.orders().len());
    for symbol in &symbols {
        match (engine.state(symbol), engine.position(symbol)) {
            (PositionState::Flat, _) | (_, None) => eprintln!("  {symbol}:  flat"),
            (state, Some(p)) => eprintln!(
                "  {symbol}:  {:?}, qty {:.6} @ {:.4} ({} scale-ins)",
                state, p.quantity, p.average_entry_price, p.scale_in_count
            ),
        }
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let sections = adapter.sections();
    let checks: [(&str, fn(&dyn ConfigPort) -> Result<(), DcabotError>); 3] = [
        ("engine", validate_engine_config),
        ("simulation", validate_simulation_config),
        ("search", validate_search_config),
    ];

    let mut checked = 0;
    for (section, check) in checks {
        if !sections.iter().any(|s| s == section) {
            continue;
        }
        if let Err(e) = check(&adapter) {
            return fail(e);
        }
        eprintln!("  [{section}] ok");
        checked += 1;
    }

    if checked == 0 {
        eprintln!("error: no [engine], [simulation] or [search] section found");
        return ExitCode::from(2);
    }

    if let Err(e) = build_strategy_params(&adapter) {
        return fail(e);
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &PathBuf, interval: &str) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let interval = match interval.parse::<BarInterval>() {
        Ok(i) => i,
        Err(reason) => return fail(DcabotError::config_invalid("cli", "interval", reason)),
    };

    let symbols = match csv_dir(&config).and_then(|dir| CsvAdapter::new(dir).list_symbols(interval))
    {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found for {interval}");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}
