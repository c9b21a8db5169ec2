//! Logging setup and the dashboard's lifecycle events.

use std::env;
use std::net::SocketAddr;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::parse_bool;
use crate::source::SourceError;

pub const LOG_LEVEL_VAR: &str = "GIFTCARD_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "GIFTCARD_LOG_FORMAT";
pub const LOG_TARGET_VAR: &str = "GIFTCARD_LOG_TARGET";

const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `giftcard_dashboard=debug`.
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_DIRECTIVE.to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Unparseable values keep their default; logging never blocks startup.
    /// `RUST_LOG` is honoured when the dashboard's own level is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let defaults = Self::default();

        Self {
            level: set(LOG_LEVEL_VAR)
                .or_else(|| set("RUST_LOG"))
                .unwrap_or(defaults.level),
            format: set(LOG_FORMAT_VAR)
                .and_then(|raw| LogFormat::parse(&raw))
                .unwrap_or(defaults.format),
            include_target: set(LOG_TARGET_VAR)
                .and_then(|raw| parse_bool(&raw))
                .unwrap_or(defaults.include_target),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(config.include_target);

    match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.with_ansi(false).json().finish())?
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "dashboard_server",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_app_bind(bound_addr: SocketAddr, base_path: &str) {
    info!(
        component = "dashboard_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        route = %format!("{base_path}/dashboard")
    );
}

pub fn log_source_selected(source: &str, reason: Option<&str>) {
    info!(
        component = "dashboard_server",
        event = "source.selected",
        source,
        reason = reason.unwrap_or("configured")
    );
}

/// The configured database could not be used; the dashboard keeps serving
/// its no-data state.
pub fn log_source_fallback(err: &SourceError) {
    warn!(
        component = "dashboard_server",
        event = "source.fallback",
        source = "unconfigured",
        error = %err
    );
}
