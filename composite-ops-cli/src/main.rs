//! composite-ops CLI: invoke a mutating endpoint and wait for it to settle.

mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use composite_ops::rest::Method;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use commands::Report;

#[derive(Parser, Debug)]
#[command(name = "composite-ops")]
#[command(about = "Invoke asynchronous cloud API operations and wait for them to complete")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
struct CommonArgs {
    /// Service endpoint, e.g. https://goldengate.us-ashburn-1.oci.oraclecloud.com
    #[arg(long, global = true, env = "COMPOSITE_OPS_ENDPOINT")]
    endpoint: Option<String>,

    /// API version prefix for work request paths
    #[arg(long, global = true, env = "COMPOSITE_OPS_API_VERSION")]
    api_version: Option<String>,

    /// TOML config file
    #[arg(long, global = true, env = "COMPOSITE_OPS_CONFIG")]
    config: Option<PathBuf>,

    /// State to wait for; repeat or comma-separate for several
    #[arg(long = "wait-for-state", global = true, value_delimiter = ',')]
    wait_for_state: Vec<String>,

    /// First polling interval in seconds
    #[arg(long, global = true, env = "COMPOSITE_OPS_INITIAL_INTERVAL_SECS")]
    initial_interval_secs: Option<u64>,

    /// Upper bound on the polling interval in seconds
    #[arg(long, global = true, env = "COMPOSITE_OPS_MAX_INTERVAL_SECS")]
    max_interval_secs: Option<u64>,

    /// Total time to wait after the mutating call, in seconds
    #[arg(long, global = true, env = "COMPOSITE_OPS_MAX_WAIT_SECS")]
    max_wait_secs: Option<u64>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, global = true, env = "COMPOSITE_OPS_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Attempts per HTTP call, including the first
    #[arg(long, global = true, env = "COMPOSITE_OPS_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Extra request header as NAME=VALUE, e.g. an authorization token
    #[arg(long = "header", global = true, value_parser = parse_key_val)]
    headers: Vec<(String, String)>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wait on an existing work request
    WorkRequest {
        /// Work request OCID
        id: String,
    },

    /// Wait on a resource's lifecycle state
    Resource {
        /// Resource OCID
        id: String,

        /// GET path template with an {id} placeholder
        #[arg(long)]
        path: String,

        /// Treat a 404 as completion, for deletions
        #[arg(long)]
        succeed_on_not_found: bool,
    },

    /// Call a mutating endpoint, then wait for the operation it started
    Invoke(InvokeArgs),
}

#[derive(Args, Debug)]
struct InvokeArgs {
    /// HTTP method
    #[arg(long, default_value = "POST", value_parser = parse_method)]
    method: Method,

    /// Path template, e.g. /20200407/deployments/{deploymentId}/actions/start
    #[arg(long)]
    path: String,

    /// Path parameter as NAME=VALUE
    #[arg(long = "param", value_parser = parse_key_val)]
    params: Vec<(String, String)>,

    /// Query parameter as NAME=VALUE
    #[arg(long = "query", value_parser = parse_key_val)]
    query: Vec<(String, String)>,

    /// JSON request body
    #[arg(long)]
    body: Option<String>,

    /// Entity tag precondition
    #[arg(long)]
    if_match: Option<String>,

    /// Idempotency token; generated when omitted
    #[arg(long)]
    retry_token: Option<String>,

    /// How completion is tracked
    #[arg(long, value_enum, default_value_t = TrackBy::WorkRequest)]
    kind: TrackBy,

    /// GET path template for the resource when --kind resource
    #[arg(long)]
    resource_path: Option<String>,

    /// Treat a 404 as completion, for deletions
    #[arg(long)]
    succeed_on_not_found: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TrackBy {
    /// Poll the work request named by opc-work-request-id
    WorkRequest,
    /// Poll the resource whose id the response body returns
    Resource,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))
}

fn parse_method(s: &str) -> Result<Method, String> {
    s.to_ascii_uppercase()
        .parse::<Method>()
        .map_err(|e| format!("invalid HTTP method '{s}': {e}"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // RUST_LOG takes precedence over -v
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.common.verbose);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match commands::execute(cli, cancel).await {
        Ok(report) => emit(&report),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn emit(report: &Report) -> ExitCode {
    match serde_json::to_string_pretty(&report.body) {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("Failed to render result: {e}"),
    }
    if let Some(error) = &report.error {
        eprintln!("Error: {error}");
    }
    report.exit_code()
}
