//! Tracing/logging initialization.
//!
//! `RUST_LOG` drives filtering (default `info`). Output is JSON unless
//! `STOREFRONT_LOG_FORMAT=pretty`. An unrecognized format falls back to JSON
//! and is reported with a warning once the subscriber is up.

use core::str::FromStr;

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV: &str = "STOREFRONT_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl LogFormat {
    /// Format for a raw `STOREFRONT_LOG_FORMAT` value. Unset means the default;
    /// an unparsable value is an error.
    pub fn from_env_value(raw: Option<&str>) -> Result<Self, String> {
        raw.map_or(Ok(LogFormat::default()), |value| value.parse())
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let raw = std::env::var(LOG_FORMAT_ENV).ok();
    match LogFormat::from_env_value(raw.as_deref()) {
        Ok(format) => init_with(format),
        Err(err) => {
            init_with(LogFormat::default());
            ::tracing::warn!(env = LOG_FORMAT_ENV, error = %err, "falling back to json log format");
        }
    }
}

pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .with_target(false)
            .try_init(),
    };
}
