//! Startup configuration read from the environment.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::observability::{log_source_fallback, log_source_selected};
use crate::source::{
    GiftCardSource, InMemorySource, SupabaseConfig, SupabaseSource, UnconfiguredSource,
    DEFAULT_TABLE,
};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Prefix used when `BASE_PATH=true` is set for sub-path hosting.
pub const LEGACY_BASE_PATH: &str = "/scraper";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address '{value}': {message}")]
    BindAddr { value: String, message: String },
    #[error("invalid {name} value '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    pub bind_addr: SocketAddr,
    /// Empty, or a path starting with `/` and without a trailing slash.
    pub base_path: String,
    pub use_demo: bool,
    /// `None` when either the address or the API key is missing.
    pub supabase: Option<SupabaseConfig>,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let raw_addr =
            non_empty("GIFTCARD_DASHBOARD_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::BindAddr {
                value: raw_addr.clone(),
                message: err.to_string(),
            })?;

        let base_path = match non_empty("GIFTCARD_BASE_PATH") {
            Some(path) => normalize_base_path(&path),
            None if non_empty("BASE_PATH").as_deref().and_then(parse_bool) == Some(true) => {
                LEGACY_BASE_PATH.to_string()
            }
            None => String::new(),
        };

        let use_demo = match non_empty("GIFTCARD_USE_DEMO") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidValue {
                name: "GIFTCARD_USE_DEMO",
                value: raw,
            })?,
            None => false,
        };

        let timeout_ms = match non_empty("GIFTCARD_HTTP_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "GIFTCARD_HTTP_TIMEOUT_MS",
                    value: raw,
                })?,
            None => DEFAULT_TIMEOUT_MS,
        };

        let address =
            non_empty("SUPABASE_ADDRESS").or_else(|| non_empty("NEXT_PUBLIC_SUPABASE_ADDRESS"));
        let api_key =
            non_empty("SUPABASE_API_KEY").or_else(|| non_empty("NEXT_PUBLIC_SUPABASE_API_KEY"));
        let table = non_empty("GIFTCARD_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());

        let supabase = match (address, api_key) {
            (Some(address), Some(api_key)) => Some(SupabaseConfig {
                address,
                api_key,
                table,
                timeout_ms,
            }),
            _ => None,
        };

        Ok(Self {
            bind_addr,
            base_path,
            use_demo,
            supabase,
        })
    }

    /// Demo rows, the configured database, or the no-data source. A database
    /// that cannot be set up degrades to the no-data source instead of
    /// failing startup.
    pub fn build_source(&self) -> Arc<dyn GiftCardSource> {
        if self.use_demo {
            log_source_selected("demo", Some("GIFTCARD_USE_DEMO"));
            return Arc::new(InMemorySource::demo());
        }

        let Some(supabase) = &self.supabase else {
            log_source_selected("unconfigured", Some("missing_supabase_credentials"));
            return Arc::new(UnconfiguredSource);
        };

        match SupabaseSource::connect(supabase) {
            Ok(source) => {
                log_source_selected("supabase", None);
                Arc::new(source)
            }
            Err(err) => {
                log_source_fallback(&err);
                Arc::new(UnconfiguredSource)
            }
        }
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
