use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, LogFormat, LogLevel};

/// Initialize structured logging to stderr, keeping stdout for command
/// output such as report JSON.
///
/// - `LogFormat::Json`: flattened JSON for log aggregators.
/// - `LogFormat::Text`: human-readable colored output.
///
/// `RUST_LOG` wins over `level` when set. Fails if a global subscriber is
/// already installed.
pub fn init_logging(level: LogLevel, format: LogFormat) -> Result<(), ConfigError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.map_err(|e| ConfigError::Validation {
        field: "agent.log_format".to_string(),
        message: format!("logging already initialized: {e}"),
    })
}

/// `level` for the auditor's crates; dependencies stay at `warn` so redb
/// and reqwest internals do not flood debug output.
fn default_filter(level: LogLevel) -> EnvFilter {
    let level = level.as_str();
    EnvFilter::new(format!(
        "warn,memory_auditor={level},application={level},adapters={level},infrastructure={level},domain={level}"
    ))
}
