#![forbid(unsafe_code)]

//! `taskpipe` — one-shot JSON-RPC call against a supervised worker process.
//!
//! Spawns the task-index worker, issues a single request, prints the JSON
//! result on stdout, and disconnects. Logs go to stderr so the result stays
//! machine-readable.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use taskpipe::{ClientConfig, ClientError, Result, RpcClient};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "taskpipe", about = "JSON-RPC stdio client for task-index workers", version, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, conflicts_with_all = ["worker", "workspace"])]
    config: Option<PathBuf>,

    /// Worker executable path (alternative to --config).
    #[arg(long, requires = "workspace")]
    worker: Option<PathBuf>,

    /// Workspace root handed to the worker.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Method to invoke on the worker.
    #[arg(long)]
    method: String,

    /// Method parameters as a JSON object.
    #[arg(long)]
    params: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| ClientError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = load_config(&args)?;
    if let Some(secs) = args.timeout {
        config.request_timeout_seconds = secs;
    }
    config.validate()?;

    let params = args
        .params
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|err| ClientError::Config(format!("invalid --params json: {err}")))?;

    let client = RpcClient::new(config);
    client.connect().await?;
    info!(method = args.method.as_str(), "issuing request");

    let outcome = client.request(&args.method, params).await;
    client.disconnect().await;

    match outcome {
        Ok(result) => {
            let rendered = serde_json::to_string_pretty(&result)
                .map_err(|err| ClientError::Decode(format!("unprintable result: {err}")))?;
            println!("{rendered}");
            Ok(())
        }
        Err(err) => {
            error!(%err, "request failed");
            Err(err)
        }
    }
}

/// Build the client configuration from `--config` or CLI flags.
fn load_config(args: &Cli) -> Result<ClientConfig> {
    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)
            .map_err(|err| ClientError::Config(format!("cannot read config: {err}")))?;
        return ClientConfig::from_toml_str(&text);
    }

    match (&args.worker, &args.workspace) {
        (Some(worker), Some(workspace)) => {
            Ok(ClientConfig::new(worker.clone(), workspace.clone()))
        }
        _ => Err(ClientError::Config(
            "either --config or both --worker and --workspace are required".into(),
        )),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}
