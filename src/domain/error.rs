//! Domain error types.

/// Top-level error type for dcabot.
#[derive(Debug, thiserror::Error)]
pub enum DcabotError {
    #[error("no market data for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("invalid market data for {symbol}: {reason}")]
    InvalidData { symbol: String, reason: String },

    #[error("order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("venue error: {reason}")]
    Venue { reason: String },

    #[error("strategy {name} does not accept parameters")]
    UnsupportedStrategy { name: String },

    #[error("unknown strategy {name}")]
    UnknownStrategy { name: String },

    #[error("degenerate parameter set: {reason}")]
    DegenerateIndividual { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DcabotError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        DcabotError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config_missing(section: &str, key: &str) -> Self {
        DcabotError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    /// Process exit status for this error class.
    pub fn exit_status(&self) -> u8 {
        match self {
            DcabotError::Io(_) | DcabotError::Serialization(_) => 1,
            DcabotError::ConfigParse { .. }
            | DcabotError::ConfigMissing { .. }
            | DcabotError::ConfigInvalid { .. } => 2,
            DcabotError::Database { .. } | DcabotError::DatabaseQuery { .. } => 3,
            DcabotError::UnsupportedStrategy { .. }
            | DcabotError::UnknownStrategy { .. }
            | DcabotError::DegenerateIndividual { .. } => 4,
            DcabotError::DataUnavailable { .. }
            | DcabotError::InsufficientData { .. }
            | DcabotError::InvalidData { .. } => 5,
            DcabotError::OrderRejected { .. } | DcabotError::Venue { .. } => 6,
        }
    }
}

impl From<&DcabotError> for std::process::ExitCode {
    fn from(err: &DcabotError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
