//! Core domain types and logic.

pub mod bar;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod metrics;
pub mod optimizer;
pub mod position;
pub mod rules;
pub mod simulation;
pub mod strategy;
pub mod trade;
