//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::{
    policy::{FORCED_REJECT_ID, PolicyParams},
    synthesis::MAX_POST_ID,
};

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides, ShowArgs, SourceOverrides, WarmArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "freshline";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";
const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REVALIDATE_SECS: u64 = 60;
const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_PARTIAL_PRECOMPUTE: u32 = 10;
const DEFAULT_STORE_LIMIT: usize = 3000;
const DEFAULT_BYPASS_COOKIE: &str = "session";
const DEFAULT_PRECOMPUTE_CONCURRENCY: usize = 8;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub source: SourceSettings,
    pub freshness: FreshnessSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
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
pub struct SourceSettings {
    /// Always ends with `/`.
    pub base_url: Url,
    pub client_timeout: Duration,
    pub revalidate_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct FreshnessSettings {
    pub interval: NonZeroU64,
    pub partial_precompute: u32,
    pub store_limit: NonZeroUsize,
    pub bypass_cookie: String,
    pub forced_reject_id: u32,
    pub precompute_concurrency: NonZeroUsize,
    pub precompute_on_start: bool,
}

impl FreshnessSettings {
    pub fn policy_params(&self) -> PolicyParams {
        PolicyParams {
            interval: time::Duration::seconds(
                i64::try_from(self.interval.get()).unwrap_or(i64::MAX),
            ),
            partial_precompute: self.partial_precompute,
            bypass_signal: self.bypass_cookie.clone(),
            forced_reject_id: self.forced_reject_id,
        }
    }
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

    builder = builder.add_source(Environment::with_prefix("FRESHLINE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Warm(args)) => {
            raw.apply_source_overrides(&args.source);
            if let Some(concurrency) = args.concurrency {
                raw.freshness.precompute_concurrency = Some(concurrency);
            }
        }
        Some(Command::Show(args)) => raw.apply_source_overrides(&args.source),
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
    source: RawSourceSettings,
    freshness: RawFreshnessSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(seconds) = overrides.interval_seconds {
            self.freshness.interval_seconds = Some(seconds);
        }
        if let Some(limit) = overrides.store_limit {
            self.freshness.store_limit = Some(limit);
        }
        if let Some(enabled) = overrides.precompute_on_start {
            self.freshness.precompute_on_start = Some(enabled);
        }

        self.apply_source_overrides(&overrides.source);
    }

    fn apply_source_overrides(&mut self, overrides: &SourceOverrides) {
        if let Some(url) = overrides.base_url.as_ref() {
            self.source.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.client_timeout_seconds {
            self.source.client_timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.revalidate_seconds {
            self.source.revalidate_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            source,
            freshness,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            source: build_source_settings(source)?,
            freshness: build_freshness_settings(freshness)?,
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

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
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

fn build_source_settings(source: RawSourceSettings) -> Result<SourceSettings, LoadError> {
    let raw_url = source
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let mut base_url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("source.base_url", format!("failed to parse: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "source.base_url",
            format!("unsupported scheme `{}`", base_url.scheme()),
        ));
    }
    if base_url.query().is_some() || base_url.fragment().is_some() {
        return Err(LoadError::invalid(
            "source.base_url",
            "must not carry a query or fragment",
        ));
    }
    if !base_url.path().ends_with('/') {
        let path = format!("{}/", base_url.path());
        base_url.set_path(&path);
    }

    let timeout_secs = source
        .client_timeout_seconds
        .unwrap_or(DEFAULT_CLIENT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "source.client_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(SourceSettings {
        base_url,
        client_timeout: Duration::from_secs(timeout_secs),
        revalidate_seconds: source.revalidate_seconds.unwrap_or(DEFAULT_REVALIDATE_SECS),
    })
}

fn build_freshness_settings(
    freshness: RawFreshnessSettings,
) -> Result<FreshnessSettings, LoadError> {
    let interval_secs = freshness.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECS);
    let interval = NonZeroU64::new(interval_secs).ok_or_else(|| {
        LoadError::invalid("freshness.interval_seconds", "must be greater than zero")
    })?;
    if i64::try_from(interval_secs).is_err() {
        return Err(LoadError::invalid(
            "freshness.interval_seconds",
            "value exceeds supported range for i64",
        ));
    }

    let partial_precompute = freshness
        .partial_precompute
        .unwrap_or(DEFAULT_PARTIAL_PRECOMPUTE);
    if partial_precompute > MAX_POST_ID {
        return Err(LoadError::invalid(
            "freshness.partial_precompute",
            format!("must not exceed {MAX_POST_ID}"),
        ));
    }

    let bypass_cookie = freshness
        .bypass_cookie
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_BYPASS_COOKIE.to_string());
    if bypass_cookie.is_empty() {
        return Err(LoadError::invalid(
            "freshness.bypass_cookie",
            "cookie name must not be empty",
        ));
    }

    Ok(FreshnessSettings {
        interval,
        partial_precompute,
        store_limit: non_zero_usize(
            freshness.store_limit.unwrap_or(DEFAULT_STORE_LIMIT),
            "freshness.store_limit",
        )?,
        bypass_cookie,
        forced_reject_id: freshness.forced_reject_id.unwrap_or(FORCED_REJECT_ID),
        precompute_concurrency: non_zero_usize(
            freshness
                .precompute_concurrency
                .unwrap_or(DEFAULT_PRECOMPUTE_CONCURRENCY),
            "freshness.precompute_concurrency",
        )?,
        precompute_on_start: freshness.precompute_on_start.unwrap_or(false),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSourceSettings {
    base_url: Option<String>,
    client_timeout_seconds: Option<u64>,
    revalidate_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFreshnessSettings {
    interval_seconds: Option<u64>,
    partial_precompute: Option<u32>,
    store_limit: Option<usize>,
    bypass_cookie: Option<String>,
    forced_reject_id: Option<u32>,
    precompute_concurrency: Option<usize>,
    precompute_on_start: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
