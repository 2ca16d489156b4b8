//! Configuration validation.
//!
//! Every field is checked before any component is built, so a bad INI file
//! fails fast with the section and key at fault.

use crate::domain::bar::{parse_timestamp, BarInterval, TimeRange};
use crate::domain::error::DcabotError;
use crate::domain::simulation::ForcedExitPolicy;
use crate::ports::config_port::ConfigPort;

pub const PARAM_SECTION_PREFIX: &str = "param.";
/// Upper bound on the per-tick lookback.
pub const MAX_HISTORY_BARS: i64 = 100_000;

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), DcabotError> {
    validate_symbols(config)?;
    parse_interval(config, "engine")?;
    validate_positive(config, "engine", "entry_allocation", 100.0)?;
    parse_levels(config)?;
    validate_positive(config, "engine", "scale_in_multiplier", 2.0)?;
    validate_non_negative_int(config, "engine", "max_scale_ins_per_window", 2)?;
    validate_at_least_one(config, "engine", "window_hours", 24)?;
    validate_history_bars(config)?;
    validate_at_least_one(config, "engine", "tick_seconds", 10)?;
    validate_positive(config, "engine", "trailing_start_pct_no_scale_in", 5.0)?;
    validate_positive(config, "engine", "trailing_start_pct_with_scale_in", 2.5)?;
    validate_trailing_gap(config)?;
    Ok(())
}

pub fn validate_simulation_config(config: &dyn ConfigPort) -> Result<(), DcabotError> {
    require(config, "simulation", "strategy")?;
    require(config, "simulation", "symbol")?;
    parse_range(config, "simulation")?;
    parse_interval(config, "simulation")?;
    validate_positive(config, "simulation", "initial_capital", 10_000.0)?;
    parse_forced_exit_policy(config)?;
    Ok(())
}

pub fn validate_search_config(config: &dyn ConfigPort) -> Result<(), DcabotError> {
    require(config, "search", "strategy")?;
    require(config, "search", "symbol")?;
    parse_range(config, "search")?;
    parse_interval(config, "search")?;
    validate_positive(config, "search", "initial_capital", 10_000.0)?;
    validate_at_least_one(config, "search", "population_size", 20)?;
    validate_at_least_one(config, "search", "generation_count", 10)?;
    validate_non_negative_int(config, "search", "seed", 42)?;
    validate_param_sections(config)?;
    Ok(())
}

pub(crate) fn require(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, DcabotError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(DcabotError::config_missing(section, key)),
    }
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), DcabotError> {
    if parse_symbols(config).is_empty() {
        return Err(DcabotError::config_missing("engine", "symbols"));
    }
    Ok(())
}

/// Comma-separated symbols, uppercased, in configured order.
pub fn parse_symbols(config: &dyn ConfigPort) -> Vec<String> {
    config
        .get_string("engine", "symbols")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn validate_positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<(), DcabotError> {
    let value = config.get_double(section, key, default);
    if !value.is_finite() || value <= 0.0 {
        return Err(DcabotError::config_invalid(
            section,
            key,
            format!("{key} must be positive"),
        ));
    }
    Ok(())
}

fn validate_non_negative_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<(), DcabotError> {
    if config.get_int(section, key, default) < 0 {
        return Err(DcabotError::config_invalid(
            section,
            key,
            format!("{key} must be non-negative"),
        ));
    }
    Ok(())
}

fn validate_at_least_one(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<(), DcabotError> {
    if config.get_int(section, key, default) < 1 {
        return Err(DcabotError::config_invalid(
            section,
            key,
            format!("{key} must be at least 1"),
        ));
    }
    Ok(())
}

fn validate_history_bars(config: &dyn ConfigPort) -> Result<(), DcabotError> {
    let value = config.get_int("engine", "history_bars", 100);
    if !(1..=MAX_HISTORY_BARS).contains(&value) {
        return Err(DcabotError::config_invalid(
            "engine",
            "history_bars",
            format!("history_bars must be between 1 and {MAX_HISTORY_BARS}"),
        ));
    }
    Ok(())
}

fn validate_trailing_gap(config: &dyn ConfigPort) -> Result<(), DcabotError> {
    let value = config.get_double("engine", "trailing_gap_pct", 0.5);
    if !(value > 0.0 && value < 100.0) {
        return Err(DcabotError::config_invalid(
            "engine",
            "trailing_gap_pct",
            "trailing_gap_pct must be between 0 and 100",
        ));
    }
    Ok(())
}

/// Scale-in levels: negative percentages, each deeper than the last.
/// An explicitly empty value disables scale-ins.
pub fn parse_levels(config: &dyn ConfigPort) -> Result<Vec<f64>, DcabotError> {
    let Some(raw) = config.get_string("engine", "scale_in_levels") else {
        return Ok(vec![-2.5, -5.0, -10.0, -20.0, -30.0, -40.0, -50.0]);
    };

    let invalid = |reason: String| DcabotError::config_invalid("engine", "scale_in_levels", reason);
    let mut levels = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let level: f64 = part
            .parse()
            .map_err(|_| invalid(format!("'{part}' is not a number")))?;
        if !level.is_finite() || level >= 0.0 {
            return Err(invalid(format!("level {part} must be negative")));
        }
        if levels.last().is_some_and(|prev| level >= *prev) {
            return Err(invalid(format!("level {part} is not deeper than the one before")));
        }
        levels.push(level);
    }
    Ok(levels)
}

pub fn parse_interval(config: &dyn ConfigPort, section: &str) -> Result<BarInterval, DcabotError> {
    match config.get_string(section, "bar_interval") {
        None => Ok(BarInterval::OneHour),
        Some(s) => s
            .parse()
            .map_err(|reason: String| DcabotError::config_invalid(section, "bar_interval", reason)),
    }
}

pub fn parse_range(config: &dyn ConfigPort, section: &str) -> Result<TimeRange, DcabotError> {
    let parse = |key: &str| {
        let raw = require(config, section, key)?;
        parse_timestamp(&raw).ok_or_else(|| {
            DcabotError::config_invalid(
                section,
                key,
                format!("'{raw}' is not RFC 3339, unix seconds or YYYY-MM-DD"),
            )
        })
    };
    let start = parse("start")?;
    let end = parse("end")?;
    if start >= end {
        return Err(DcabotError::config_invalid(
            section,
            "start",
            "start must be before end",
        ));
    }
    Ok(TimeRange::new(start, end))
}

pub fn parse_forced_exit_policy(config: &dyn ConfigPort) -> Result<ForcedExitPolicy, DcabotError> {
    match config
        .get_string("simulation", "forced_exits")
        .map(|s| s.trim().to_lowercase())
        .as_deref()
    {
        None | Some("include") => Ok(ForcedExitPolicy::Include),
        Some("exclude_from_win_rate") => Ok(ForcedExitPolicy::ExcludeFromWinRate),
        Some(other) => Err(DcabotError::config_invalid(
            "simulation",
            "forced_exits",
            format!("'{other}' is not include or exclude_from_win_rate"),
        )),
    }
}

fn validate_param_sections(config: &dyn ConfigPort) -> Result<(), DcabotError> {
    let sections: Vec<String> = config
        .sections()
        .into_iter()
        .filter(|s| s.starts_with(PARAM_SECTION_PREFIX))
        .collect();
    if sections.is_empty() {
        return Err(DcabotError::config_missing("param.<name>", "min"));
    }

    for section in &sections {
        let bound = |key: &str| -> Result<f64, DcabotError> {
            let raw = require(config, section, key)?;
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| DcabotError::config_invalid(section, key, format!("'{raw}' is not a number")))
        };
        let min = bound("min")?;
        let max = bound("max")?;
        if min > max {
            return Err(DcabotError::config_invalid(section, "min", "min must not exceed max"));
        }
        if config.get_string(section, "step").is_some() && config.get_double(section, "step", 0.0) <= 0.0 {
            return Err(DcabotError::config_invalid(section, "step", "step must be positive"));
        }
    }
    Ok(())
}
