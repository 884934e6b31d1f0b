use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the deckshelf binary.
#[derive(Debug, Parser)]
#[command(name = "deckshelf", version, about = "Deck registry and image renderer")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DECKSHELF_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Render one deck image through the configured backends.
    Render(RenderArgs),
    /// Register a deck if needed and print its shortid.
    Resolve(ResolveArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Deck code to render.
    #[arg(value_name = "DECKCODE")]
    pub deckcode: String,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Deck code or shortid to resolve.
    #[arg(value_name = "DECKCODE_OR_SHORTID")]
    pub value: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the expected image version tag.
    #[arg(long = "render-image-version", value_name = "TAG")]
    pub render_image_version: Option<String>,

    /// Override the public site URL used by the internal renderer.
    #[arg(long = "render-site-url", value_name = "URL")]
    pub render_site_url: Option<String>,

    /// Toggle the urlbox render backend.
    #[arg(
        long = "render-urlbox-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub render_urlbox_enabled: Option<bool>,

    /// Override how many times an image read polls a running render.
    #[arg(long = "poll-max-attempts", value_name = "COUNT")]
    pub poll_max_attempts: Option<u32>,

    /// Override the delay between image polls.
    #[arg(long = "poll-interval-ms", value_name = "MILLIS")]
    pub poll_interval_ms: Option<u64>,
}
