//! Log-only alert and ledger sinks.

use crate::domain::error::DcabotError;
use crate::domain::trade::TradeEvent;
use crate::ports::alert_port::{AlertPort, Severity};
use crate::ports::fill_ledger_port::FillLedgerPort;
use tracing::{error, info, warn};

/// Tracing target for alerts routed through [`TracingAlerts`].
pub const ALERT_TARGET: &str = "alert";

/// Ledger target; kept apart from the engine's own trade log.
pub const LEDGER_TARGET: &str = "ledger";

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerts;

impl AlertPort for TracingAlerts {
    fn notify(&self, message: &str, severity: Severity) -> Result<(), DcabotError> {
        match severity {
            Severity::Info => info!(target: ALERT_TARGET, %severity, "{message}"),
            Severity::Warning => warn!(target: ALERT_TARGET, %severity, "{message}"),
            Severity::Error | Severity::Critical => {
                error!(target: ALERT_TARGET, %severity, "{message}")
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLedger;

impl FillLedgerPort for TracingLedger {
    fn record_fill(&self, event: &TradeEvent) -> Result<(), DcabotError> {
        let record = serde_json::to_string(event)?;
        info!(target: LEDGER_TARGET, symbol = %event.symbol, "{record}");
        Ok(())
    }

    fn fills_since_last_exit(&self, _symbol: &str) -> Result<Vec<TradeEvent>, DcabotError> {
        Ok(Vec::new())
    }
}
