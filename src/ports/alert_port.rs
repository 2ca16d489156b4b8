//! Outbound alerting port.

use serde::Serialize;
use std::fmt;

use crate::domain::error::DcabotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Best effort: callers log a failed notification and carry on.
pub trait AlertPort {
    fn notify(&self, message: &str, severity: Severity) -> Result<(), DcabotError>;
}
