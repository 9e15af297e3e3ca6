//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
#[cfg(test)]
mod tests;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CatalogOverrides, CliArgs, Command, FeedArgs, FeedFormatArg, FeedKind, ServeArgs,
    ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "bookfeed";
const ENV_PREFIX: &str = "BOOKFEED";
const TOKEN_ENV_VAR: &str = "HARDCOVER_TOKEN";
const PORT_ENV_VAR: &str = "PORT";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CATALOG_ENDPOINT: &str = "https://api.hardcover.app/v1/graphql";
const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 20;
const DEFAULT_CATALOG_MAX_ATTEMPTS: u64 = 4;
const DEFAULT_CATALOG_INITIAL_BACKOFF_MS: u64 = 250;
const DEFAULT_CATALOG_MAX_BACKOFF_MS: u64 = 5_000;
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;
const DEFAULT_COLLECTION_TTL_SECS: u64 = 12 * 60 * 60;
const DEFAULT_INTEREST_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_NOT_FOUND_TTL_SECS: u64 = 60 * 60;
const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_SNAPSHOT_DIR: &str = ".";
const DEFAULT_RECENT_LOOKBACK_DAYS: u64 = 30;
const DEFAULT_ENTITY_LOOKBACK_DAYS: u64 = 365;
const DEFAULT_LIBRARY_LOOKBACK_DAYS: u64 = 730;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 10;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 10;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub catalog: CatalogSettings,
    pub cache: CacheSettings,
    pub releases: ReleaseSettings,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
    /// Log every served request, not only failures.
    pub requests: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub endpoint: Url,
    pub token: Option<String>,
    pub include_compilations: bool,
    pub request_timeout: Duration,
    pub max_attempts: NonZeroU32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub collection_capacity: NonZeroU64,
    pub interest_capacity: NonZeroU64,
    pub collection_ttl: Duration,
    pub interest_ttl: Duration,
    pub not_found_ttl: Duration,
    pub enable_snapshots: bool,
    pub snapshot_dir: PathBuf,
    pub snapshot_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ReleaseSettings {
    pub recent_lookback_days: NonZeroU32,
    pub entity_lookback_days: NonZeroU32,
    pub library_lookback_days: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
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
    raw.apply_platform_env(|name| std::env::var(name).ok());

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Feed(args)) => raw.apply_catalog_overrides(&args.catalog),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    catalog: RawCatalogSettings,
    cache: RawCacheSettings,
    releases: RawReleaseSettings,
    rate_limit: RawRateLimitSettings,
}

impl RawSettings {
    /// Fill gaps from the unprefixed variables container platforms set.
    fn apply_platform_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.catalog.token.is_none() {
            self.catalog.token = lookup(TOKEN_ENV_VAR);
        }
        if self.server.port.is_none() {
            self.server.port = lookup(PORT_ENV_VAR).and_then(|value| value.trim().parse().ok());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.server_request_timeout_seconds {
            self.server.request_timeout_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(requests) = overrides.log_requests {
            self.logging.requests = Some(requests);
        }
        if let Some(dir) = overrides.cache_snapshot_dir.as_ref() {
            self.cache.snapshot_dir = Some(dir.clone());
        }
        if let Some(enabled) = overrides.cache_enable_snapshots {
            self.cache.enable_snapshots = Some(enabled);
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = Some(max);
        }
        self.apply_catalog_overrides(&overrides.catalog);
    }

    fn apply_catalog_overrides(&mut self, overrides: &CatalogOverrides) {
        if let Some(endpoint) = overrides.endpoint.as_ref() {
            self.catalog.endpoint = Some(endpoint.clone());
        }
        if let Some(token) = overrides.token.as_ref() {
            self.catalog.token = Some(token.clone());
        }
        if let Some(include) = overrides.include_compilations {
            self.catalog.include_compilations = Some(include);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            catalog,
            cache,
            releases,
            rate_limit,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            catalog: build_catalog_settings(catalog)?,
            cache: build_cache_settings(cache)?,
            releases: build_release_settings(releases)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_shutdown = positive_secs(
        server.graceful_shutdown_seconds,
        DEFAULT_GRACEFUL_SHUTDOWN_SECS,
        "server.graceful_shutdown_seconds",
    )?;
    let request_timeout = positive_secs(
        server.request_timeout_seconds,
        DEFAULT_REQUEST_TIMEOUT_SECS,
        "server.request_timeout_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
        request_timeout,
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

    Ok(LoggingSettings {
        level,
        format,
        requests: logging.requests.unwrap_or(false),
    })
}

fn build_catalog_settings(catalog: RawCatalogSettings) -> Result<CatalogSettings, LoadError> {
    let endpoint = catalog
        .endpoint
        .unwrap_or_else(|| DEFAULT_CATALOG_ENDPOINT.to_string());
    let endpoint = Url::parse(endpoint.trim())
        .map_err(|err| LoadError::invalid("catalog.endpoint", format!("invalid URL: {err}")))?;

    let token = catalog.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let request_timeout = positive_secs(
        catalog.request_timeout_seconds,
        DEFAULT_CATALOG_TIMEOUT_SECS,
        "catalog.request_timeout_seconds",
    )?;
    let max_attempts = non_zero_u32(
        catalog.max_attempts.unwrap_or(DEFAULT_CATALOG_MAX_ATTEMPTS),
        "catalog.max_attempts",
    )?;
    let initial_backoff = Duration::from_millis(
        catalog
            .initial_backoff_ms
            .unwrap_or(DEFAULT_CATALOG_INITIAL_BACKOFF_MS),
    );
    let max_backoff = Duration::from_millis(
        catalog
            .max_backoff_ms
            .unwrap_or(DEFAULT_CATALOG_MAX_BACKOFF_MS),
    );
    if max_backoff < initial_backoff {
        return Err(LoadError::invalid(
            "catalog.max_backoff_ms",
            "must not be smaller than catalog.initial_backoff_ms",
        ));
    }

    Ok(CatalogSettings {
        endpoint,
        token,
        include_compilations: catalog.include_compilations.unwrap_or(false),
        request_timeout,
        max_attempts,
        initial_backoff,
        max_backoff,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let collection_capacity = NonZeroU64::new(
        cache
            .collection_capacity
            .unwrap_or(DEFAULT_CACHE_CAPACITY),
    )
    .ok_or_else(|| LoadError::invalid("cache.collection_capacity", "must be greater than zero"))?;
    let interest_capacity = NonZeroU64::new(cache.interest_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY))
        .ok_or_else(|| LoadError::invalid("cache.interest_capacity", "must be greater than zero"))?;

    let collection_ttl = positive_secs(
        cache.collection_ttl_seconds,
        DEFAULT_COLLECTION_TTL_SECS,
        "cache.collection_ttl_seconds",
    )?;
    let interest_ttl = positive_secs(
        cache.interest_ttl_seconds,
        DEFAULT_INTEREST_TTL_SECS,
        "cache.interest_ttl_seconds",
    )?;
    let not_found_ttl = positive_secs(
        cache.not_found_ttl_seconds,
        DEFAULT_NOT_FOUND_TTL_SECS,
        "cache.not_found_ttl_seconds",
    )?;
    let snapshot_interval = positive_secs(
        cache.snapshot_interval_seconds,
        DEFAULT_SNAPSHOT_INTERVAL_SECS,
        "cache.snapshot_interval_seconds",
    )?;

    let snapshot_dir = cache
        .snapshot_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));
    if snapshot_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.snapshot_dir",
            "path must not be empty",
        ));
    }

    Ok(CacheSettings {
        collection_capacity,
        interest_capacity,
        collection_ttl,
        interest_ttl,
        not_found_ttl,
        enable_snapshots: cache.enable_snapshots.unwrap_or(true),
        snapshot_dir,
        snapshot_interval,
    })
}

fn build_release_settings(releases: RawReleaseSettings) -> Result<ReleaseSettings, LoadError> {
    Ok(ReleaseSettings {
        recent_lookback_days: non_zero_u32(
            releases
                .recent_lookback_days
                .unwrap_or(DEFAULT_RECENT_LOOKBACK_DAYS),
            "releases.recent_lookback_days",
        )?,
        entity_lookback_days: non_zero_u32(
            releases
                .entity_lookback_days
                .unwrap_or(DEFAULT_ENTITY_LOOKBACK_DAYS),
            "releases.entity_lookback_days",
        )?,
        library_lookback_days: non_zero_u32(
            releases
                .library_lookback_days
                .unwrap_or(DEFAULT_LIBRARY_LOOKBACK_DAYS),
            "releases.library_lookback_days",
        )?,
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_seconds_val = rate_limit
        .window_seconds
        .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);
    let window_seconds = non_zero_u32(window_seconds_val, "rate_limit.window_seconds")?;

    let max_requests_val = rate_limit
        .max_requests
        .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS);
    let max_requests = non_zero_u32(max_requests_val, "rate_limit.max_requests")?;

    Ok(RateLimitSettings {
        enabled: rate_limit.enabled.unwrap_or(true),
        window_seconds,
        max_requests,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
    requests: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCatalogSettings {
    endpoint: Option<String>,
    token: Option<String>,
    include_compilations: Option<bool>,
    request_timeout_seconds: Option<u64>,
    max_attempts: Option<u64>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    collection_capacity: Option<u64>,
    interest_capacity: Option<u64>,
    collection_ttl_seconds: Option<u64>,
    interest_ttl_seconds: Option<u64>,
    not_found_ttl_seconds: Option<u64>,
    enable_snapshots: Option<bool>,
    snapshot_dir: Option<PathBuf>,
    snapshot_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReleaseSettings {
    recent_lookback_days: Option<u64>,
    entity_lookback_days: Option<u64>,
    library_lookback_days: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    enabled: Option<bool>,
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_secs(
    value: Option<u64>,
    default: u64,
    key: &'static str,
) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        seconds => Ok(Duration::from_secs(seconds)),
    }
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
