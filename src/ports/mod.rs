//! Port traits: the boundary between the domain and the outside world.

pub mod alert_port;
pub mod config_port;
pub mod fill_ledger_port;
pub mod market_data_port;
pub mod order_port;
pub mod quote_port;
pub mod report_port;
pub mod signal_port;
