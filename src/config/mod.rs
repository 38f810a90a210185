//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{
    CliArgs, Command, GlobalOverrides, NotificationsArgs, NotificationsCmd, SetPreferencesArgs,
    UsersArgs, UsersCmd, WatchArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "coherence";
const ENV_PREFIX: &str = "COHERENCE";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
const DEFAULT_USER_SEARCH_LIMIT: u64 = 20;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub logging: LoggingSettings,
    pub polling: PollingSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Required by every command that talks to the server; checked when the gateway is built.
    pub base_url: Option<Url>,
    pub timeout: Duration,
    pub session_token_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct PollingSettings {
    pub notification_counts_interval: Duration,
    pub unread_count_interval: Duration,
    pub refetch_on_focus: bool,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub user_search_limit: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_global_overrides(&cli.overrides);
    if let Command::Watch(args) = &cli.command {
        raw.apply_watch_overrides(args);
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    gateway: RawGatewaySettings,
    logging: RawLoggingSettings,
    polling: RawPollingSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(site) = overrides.site.as_ref() {
            self.gateway.base_url = Some(site.clone());
        }
        if let Some(path) = overrides.key_file.as_ref() {
            self.gateway.session_token_file = Some(path.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.gateway.timeout_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_watch_overrides(&mut self, args: &WatchArgs) {
        if let Some(interval_ms) = args.interval_ms {
            self.polling.notification_counts_interval_ms = Some(interval_ms);
            self.polling.unread_count_interval_ms = Some(interval_ms);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            gateway,
            logging,
            polling,
            cache,
        } = raw;

        Ok(Self {
            gateway: build_gateway_settings(gateway)?,
            logging: build_logging_settings(logging)?,
            polling: build_polling_settings(polling)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_gateway_settings(gateway: RawGatewaySettings) -> Result<GatewaySettings, LoadError> {
    let base_url = match gateway.base_url.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => {
            let parsed = Url::parse(value)
                .map_err(|err| LoadError::invalid("gateway.base_url", err.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "gateway.base_url",
                    format!("unsupported scheme `{}`", parsed.scheme()),
                ));
            }
            Some(parsed)
        }
    };

    let timeout_secs = gateway
        .timeout_seconds
        .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "gateway.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let session_token_file = gateway
        .session_token_file
        .filter(|path| !path.as_os_str().is_empty());

    Ok(GatewaySettings {
        base_url,
        timeout: Duration::from_secs(timeout_secs),
        session_token_file,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_polling_settings(polling: RawPollingSettings) -> Result<PollingSettings, LoadError> {
    let counts_ms = polling
        .notification_counts_interval_ms
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    if counts_ms == 0 {
        return Err(LoadError::invalid(
            "polling.notification_counts_interval_ms",
            "must be greater than zero",
        ));
    }

    let unread_ms = polling
        .unread_count_interval_ms
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    if unread_ms == 0 {
        return Err(LoadError::invalid(
            "polling.unread_count_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(PollingSettings {
        notification_counts_interval: Duration::from_millis(counts_ms),
        unread_count_interval: Duration::from_millis(unread_ms),
        refetch_on_focus: polling.refetch_on_focus.unwrap_or(true),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let user_search_limit = non_zero_u32(
        cache
            .user_search_limit
            .unwrap_or(DEFAULT_USER_SEARCH_LIMIT),
        "cache.user_search_limit",
    )?;
    Ok(CacheSettings { user_search_limit })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGatewaySettings {
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
    session_token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPollingSettings {
    notification_counts_interval_ms: Option<u64>,
    unread_count_interval_ms: Option<u64>,
    refetch_on_focus: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    user_search_limit: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
