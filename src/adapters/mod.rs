//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_report_adapter;
pub mod log_adapter;
pub mod paper_venue;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
