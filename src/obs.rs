//! Tracing subscriber setup.

/// Environment variable that overrides `--log-level`.
pub const LOG_ENV: &str = "DCABOT_LOG";

/// Install the global subscriber. `log_format` is `json` or anything else
/// for human-readable lines. Output goes to stderr.
pub fn init_tracing(log_level: &str, log_format: &str) -> Result<(), String> {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let installed = if log_format.trim().eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| format!("failed to install tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_filter() {
        if std::env::var(LOG_ENV).is_ok() {
            return;
        }
        assert!(init_tracing("dcabot=loudest", "text").is_err());
    }
}
