//! dcabot: DCA position engine, historical simulator and genetic
//! parameter search.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod obs;
pub mod ports;
