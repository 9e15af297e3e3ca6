use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

/// Command-line arguments for the bookfeed binary.
#[derive(Debug, Parser)]
#[command(name = "bookfeed", version, about = "Book release feeds for Hardcover")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BOOKFEED_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the feed HTTP server.
    Serve(Box<ServeArgs>),
    /// Print one feed to stdout and exit.
    Feed(FeedArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CatalogOverrides {
    /// Override the Hardcover GraphQL endpoint.
    #[arg(long = "catalog-endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Override the Hardcover API token.
    #[arg(long = "catalog-token", value_name = "TOKEN")]
    pub token: Option<String>,

    /// Include compilations in author and series feeds.
    #[arg(
        long = "catalog-include-compilations",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub include_compilations: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub catalog: CatalogOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the per-request deadline.
    #[arg(long = "server-request-timeout-seconds", value_name = "SECONDS")]
    pub server_request_timeout_seconds: Option<u64>,

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

    /// Log successful requests as well as failures.
    #[arg(
        long = "log-requests",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_requests: Option<bool>,

    /// Override the directory cache snapshots are written to.
    #[arg(long = "cache-snapshot-dir", value_name = "PATH")]
    pub cache_snapshot_dir: Option<PathBuf>,

    /// Enable or disable cache snapshots.
    #[arg(
        long = "cache-enable-snapshots",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enable_snapshots: Option<bool>,

    /// Override the rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the rate limit request ceiling.
    #[arg(long = "rate-limit-max-requests", value_name = "COUNT")]
    pub rate_limit_max_requests: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeedKind {
    Recent,
    Author,
    Series,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FeedFormatArg {
    #[default]
    Rss,
    Atom,
    Json,
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    #[command(flatten)]
    pub catalog: CatalogOverrides,

    /// Which feed to build.
    #[arg(value_enum, value_name = "KIND")]
    pub kind: FeedKind,

    /// Author or series slug, or username for `user` feeds.
    #[arg(value_name = "SLUG")]
    pub slug: Option<String>,

    /// Restrict a user feed to `author` or `series` interests.
    #[arg(long, value_name = "FILTER")]
    pub filter: Option<String>,

    /// Output encoding.
    #[arg(long, value_enum, default_value_t = FeedFormatArg::Rss)]
    pub format: FeedFormatArg,
}
