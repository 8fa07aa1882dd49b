use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::policy::PolicyId;

/// Command-line arguments for the freshline binary.
#[derive(Debug, Parser)]
#[command(
    name = "freshline",
    version,
    about = "Content freshness policy server"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "FRESHLINE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP delivery surface.
    Serve(Box<ServeArgs>),
    /// Precompute stored views for one policy, or all of them.
    Warm(WarmArgs),
    /// Resolve one request and print the outcome as JSON.
    Show(ShowArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct SourceOverrides {
    /// Override the content service base URL.
    #[arg(long = "source-base-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub base_url: Option<String>,

    /// Override the client transport timeout.
    #[arg(long = "source-client-timeout-seconds", value_name = "SECONDS")]
    pub client_timeout_seconds: Option<u64>,

    /// Override how long the canonical post set is reused (0 disables).
    #[arg(long = "source-revalidate-seconds", value_name = "SECONDS")]
    pub revalidate_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub source: SourceOverrides,

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

    /// Override the regeneration interval of periodic policies.
    #[arg(long = "freshness-interval-seconds", value_name = "SECONDS")]
    pub interval_seconds: Option<u64>,

    /// Override the maximum number of stored views.
    #[arg(long = "freshness-store-limit", value_name = "COUNT")]
    pub store_limit: Option<usize>,

    /// Precompute every policy before accepting requests.
    #[arg(
        long = "freshness-precompute-on-start",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub precompute_on_start: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WarmArgs {
    #[command(flatten)]
    pub source: SourceOverrides,

    /// Policy to warm (label, letter or name); all policies when omitted.
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<PolicyId>,

    /// Maximum number of views generated concurrently.
    #[arg(long, value_name = "COUNT")]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub source: SourceOverrides,

    /// Policy to serve through (label, letter or name).
    #[arg(value_name = "POLICY")]
    pub policy: PolicyId,

    /// Post id to request.
    #[arg(value_name = "ID")]
    pub post_id: u32,

    /// Identity signal to attach to the request; repeatable.
    #[arg(long = "signal", value_name = "NAME")]
    pub signals: Vec<String>,
}
