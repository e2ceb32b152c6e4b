//! Log output setup for the harness process.

use std::str::FromStr;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: OnceLock<LogFormat> = OnceLock::new();

/// Environment variable selecting the log format when none is passed explicitly.
pub const LOG_FORMAT_ENV_VAR: &str = "HARNESS_LOG_FORMAT";

/// Output format of the process logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" | "plain" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl LogFormat {
    /// Format named by `HARNESS_LOG_FORMAT`, compact when unset or unrecognised.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV_VAR)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

/// Install the global subscriber. Later calls are no-ops and return the
/// format chosen by the first one.
///
/// `RUST_LOG` drives filtering; the default is `info`.
pub fn init_tracing(format: Option<LogFormat>) -> LogFormat {
    *TRACING_INIT.get_or_init(|| {
        let format = format.unwrap_or_else(LogFormat::from_env);
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_current_span(false))
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_target(false))
                .try_init(),
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
        format
    })
}
