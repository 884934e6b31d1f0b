//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::shortid::ShortidPolicy;

pub use cli::{
    CliArgs, Command, DatabaseOverride, RenderArgs, ResolveArgs, ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "deckshelf";
const ENV_PREFIX: &str = "DECKSHELF";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_IMAGE_VERSION: &str = "2.1";
const DEFAULT_SITE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub render: RenderSettings,
    pub poll: PollSettings,
    pub shortid: ShortidPolicy,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Tag written next to every rendered image; images with any other tag
    /// are stale.
    pub image_version: String,
    pub site_url: Url,
    pub short_url_base: Url,
    pub request_timeout: Duration,
    pub urlbox: Option<UrlboxSettings>,
}

#[derive(Clone)]
pub struct UrlboxSettings {
    pub api_key: String,
}

impl std::fmt::Debug for UrlboxSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlboxSettings")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub max_attempts: NonZeroU32,
    pub interval: Duration,
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

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_database_override(&args.database),
        Some(Command::Resolve(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    render: RawRenderSettings,
    poll: RawPollSettings,
    shortid: RawShortidSettings,
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(version) = overrides.render_image_version.as_ref() {
            self.render.image_version = Some(version.clone());
        }
        if let Some(url) = overrides.render_site_url.as_ref() {
            self.render.site_url = Some(url.clone());
        }
        if let Some(enabled) = overrides.render_urlbox_enabled {
            self.render.urlbox_enabled = Some(enabled);
        }
        if let Some(attempts) = overrides.poll_max_attempts {
            self.poll.max_attempts = Some(attempts);
        }
        if let Some(interval) = overrides.poll_interval_ms {
            self.poll.interval_ms = Some(interval);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            render,
            poll,
            shortid,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            render: build_render_settings(render)?,
            poll: build_poll_settings(poll)?,
            shortid: build_shortid_policy(shortid)?,
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let image_version = render
        .image_version
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_IMAGE_VERSION.to_string());
    if image_version.is_empty() {
        return Err(LoadError::invalid(
            "render.image_version",
            "must not be empty",
        ));
    }

    let site_url = parse_base_url(
        render.site_url.as_deref().unwrap_or(DEFAULT_SITE_URL),
        "render.site_url",
    )?;
    let short_url_base = match render.short_url_base.as_deref() {
        Some(value) => parse_base_url(value, "render.short_url_base")?,
        None => site_url.clone(),
    };

    let timeout_secs = render
        .request_timeout_seconds
        .unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS);
    let request_timeout = NonZeroU64::new(timeout_secs)
        .map(|secs| Duration::from_secs(secs.get()))
        .ok_or_else(|| {
            LoadError::invalid("render.request_timeout_seconds", "must be greater than zero")
        })?;

    let urlbox = if render.urlbox_enabled.unwrap_or(false) {
        let api_key = render
            .urlbox_api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                LoadError::invalid(
                    "render.urlbox_api_key",
                    "required when render.urlbox_enabled is true",
                )
            })?;
        Some(UrlboxSettings { api_key })
    } else {
        None
    };

    Ok(RenderSettings {
        image_version,
        site_url,
        short_url_base,
        request_timeout,
        urlbox,
    })
}

fn build_poll_settings(poll: RawPollSettings) -> Result<PollSettings, LoadError> {
    let max_attempts = non_zero_u32(
        poll.max_attempts.unwrap_or(DEFAULT_POLL_MAX_ATTEMPTS).into(),
        "poll.max_attempts",
    )?;

    let interval_ms = poll.interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    if interval_ms == 0 {
        return Err(LoadError::invalid(
            "poll.interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(PollSettings {
        max_attempts,
        interval: Duration::from_millis(interval_ms),
    })
}

fn build_shortid_policy(shortid: RawShortidSettings) -> Result<ShortidPolicy, LoadError> {
    let defaults = ShortidPolicy::default();
    ShortidPolicy::new(
        shortid.batch_size.unwrap_or(defaults.batch_size),
        shortid.initial_length.unwrap_or(defaults.initial_length),
        shortid.max_length.unwrap_or(defaults.max_length),
    )
    .map_err(|err| LoadError::invalid("shortid", err.to_string()))
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    image_version: Option<String>,
    site_url: Option<String>,
    short_url_base: Option<String>,
    request_timeout_seconds: Option<u64>,
    urlbox_enabled: Option<bool>,
    urlbox_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPollSettings {
    max_attempts: Option<u32>,
    interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawShortidSettings {
    batch_size: Option<usize>,
    initial_length: Option<usize>,
    max_length: Option<usize>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_base_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(LoadError::invalid(key, format!("`{value}` cannot be a base url")));
    }
    Ok(url)
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

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
