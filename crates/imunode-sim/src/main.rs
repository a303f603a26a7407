//! IMU node simulator.
//!
//! Run with: `cargo run -p imunode-sim -- --nodes J,K --format csv`

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use imunode_sim::{Config, FormatOptions, NodeSpec, OutputFormat, default_config_path, run_simulation};

/// Simulate IMU sensor nodes streaming to a gateway.
#[derive(Parser, Debug)]
#[command(name = "imunode-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node ids, comma separated (overrides config).
    #[arg(short, long, value_delimiter = ',')]
    nodes: Vec<char>,

    /// Sampling interval in milliseconds (overrides config).
    #[arg(short, long)]
    interval: Option<u16>,

    /// Capture duration in seconds (overrides config).
    #[arg(short, long)]
    duration: Option<u64>,

    /// Output format (overrides config).
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Omit the CSV header.
    #[arg(long)]
    no_header: bool,

    /// Put nodes to sleep after the capture instead of disconnecting.
    #[arg(long)]
    deep_sleep: bool,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so frame output stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("imunode=info".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    if !args.nodes.is_empty() {
        config.nodes = args.nodes.iter().copied().map(NodeSpec::with_id).collect();
    }
    if let Some(interval) = args.interval {
        config.gateway.sampling_interval_ms = interval;
    }
    if let Some(duration) = args.duration {
        config.gateway.capture_secs = duration;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    config.output.no_header |= args.no_header;
    config.gateway.deep_sleep |= args.deep_sleep;

    if args.save_config {
        let path = args.config.clone().unwrap_or_else(default_config_path);
        config.validate()?;
        config.save(&path)?;
        info!("Saved configuration to {}", path.display());
        return Ok(());
    }

    let options = FormatOptions::new(config.output.format, config.output.no_header);
    let stdout = std::io::stdout();
    let report = run_simulation(
        &config,
        |aligner| {
            if let Some(header) = options.header(aligner) {
                let _ = writeln!(stdout.lock(), "{}", header);
            }
        },
        |row| {
            let _ = writeln!(stdout.lock(), "{}", options.row(row));
        },
    )
    .await?;

    let gateway = &report.gateway;
    info!(
        "Capture done: {} rows from {} notifications ({} undecodable, {} dropped)",
        gateway.rows, gateway.notifications, gateway.decode_errors, gateway.dropped
    );
    for node in &report.nodes {
        match &node.result {
            Ok(cause) => info!("Node '{}': deep sleep ({})", node.device_id, cause),
            Err(e) => info!("Node '{}': {}", node.device_id, e),
        }
    }

    Ok(())
}
