//! `r2router` command line.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use r2_runner::{Runner, RunnerConfig, RunnerError};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Simulated r2 device router node with its serial port on TCP.
#[derive(Parser, Debug)]
#[command(name = "r2router", version, about)]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node address to persist before starting (0 = master).
    #[arg(long)]
    node_id: Option<u8>,

    /// Address for the serial bridge, e.g. 127.0.0.1:7400.
    #[arg(short, long)]
    listen: Option<String>,

    /// Non-volatile storage file.
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Simulated slave addresses (comma separated).
    #[arg(long, value_delimiter = ',')]
    slaves: Vec<u8>,

    /// Serve Prometheus metrics on this address (needs the `prometheus` feature).
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<RunnerConfig, RunnerError> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    if cli.node_id.is_some() {
        config.node_id = cli.node_id;
    }
    if let Some(listen) = &cli.listen {
        config.listen = listen.clone();
    }
    if cli.storage.is_some() {
        config.storage = cli.storage.clone();
    }
    if cli.metrics_listen.is_some() {
        config.metrics_listen = cli.metrics_listen;
    }
    if !cli.slaves.is_empty() {
        config.slaves = cli.slaves.clone();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "prometheus")]
fn install_exporter(addr: SocketAddr) -> Result<(), RunnerError> {
    r2_metrics::install_prometheus(addr).map_err(|e| RunnerError::Metrics(e.to_string()))?;
    tracing::info!(%addr, "serving metrics");
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_exporter(addr: SocketAddr) -> Result<(), RunnerError> {
    tracing::warn!(%addr, "built without the prometheus feature, metrics are not served");
    Ok(())
}

async fn run(cli: Cli) -> Result<(), RunnerError> {
    let config = load_config(&cli)?;
    if let Some(addr) = config.metrics_listen {
        install_exporter(addr)?;
    }
    r2_metrics::describe_metrics();

    let runner = Runner::start(config).await?;
    eprintln!("r2router listening on {}", runner.local_addr()?);
    runner
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "r2router failed");
            ExitCode::FAILURE
        }
    }
}
