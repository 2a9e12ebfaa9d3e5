//! telemetry-uplink - batched telemetry delivery
//!
//! Streams newline-delimited JSON events into the batching pipeline and
//! delivers each batch through the primary API channel, the secondary
//! object-storage channel, or the local fallback directory.
//!
//! # Usage
//!
//! ```bash
//! # Stream events from another process
//! ./event-source | telemetry-uplink --config telemetry_uplink.toml
//!
//! # Replay a captured file with smaller batches
//! telemetry-uplink --input events.ndjson --threshold 20
//!
//! # List batches waiting in the fallback directory
//! telemetry-uplink pending
//! ```
//!
//! Each input line is one event:
//! `{"timestamp":"2024-03-01T12:30:00Z","eventType":"screen_view","payload":{"screen":"home"}}`
//!
//! # Environment Variables
//!
//! - `TELEMETRY_UPLINK_CONFIG`: Path to the TOML config file
//! - `TELEMETRY_API_KEY`: Bearer key for the primary collector API
//! - `TELEMETRY_STORAGE_TOKEN`: Optional bearer token for the object store
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use telemetry_uplink::storage::LocalFallbackStore;
use telemetry_uplink::{DispatchSnapshot, Event, Uplink, UplinkConfig};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "telemetry-uplink")]
#[command(about = "Batch telemetry events and deliver them with retry and fallback")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file (overrides TELEMETRY_UPLINK_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read events from this NDJSON file instead of stdin
    #[arg(short, long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Override the batch size threshold
    #[arg(long)]
    threshold: Option<usize>,

    /// Emit logs as JSON
    #[arg(long, env = "TELEMETRY_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// List batches persisted in the local fallback directory
    Pending,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.json_logs);

    let mut config = match &args.config {
        Some(path) => {
            let mut config = UplinkConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config
        }
        None => UplinkConfig::load(),
    };
    if let Some(threshold) = args.threshold {
        config.batching.threshold = threshold;
    }

    if let Some(SubCommand::Pending) = args.command {
        return list_pending(&config);
    }

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let uplink = Uplink::from_config(&config).context("Failed to start telemetry uplink")?;

    let (pumped, stats) = drain_input(input, &uplink).await;
    info!("{}", stats);
    pumped?;

    if stats.lost > 0 {
        error!(lost = stats.lost, "Some batches could not be delivered or persisted");
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PumpSummary {
    accepted: u64,
    skipped: u64,
}

/// Pump `reader` into the uplink, then flush and wait for every delivery.
///
/// The shutdown runs even when reading fails part way, so events accepted
/// before the failure still reach a channel or the fallback directory.
async fn drain_input<R>(reader: R, uplink: &Uplink) -> (Result<PumpSummary>, DispatchSnapshot)
where
    R: AsyncBufRead + Unpin,
{
    let pumped = pump_events(reader, uplink).await;
    match &pumped {
        Ok(summary) => info!(
            events = summary.accepted,
            skipped = summary.skipped,
            "Input finished, flushing and waiting for deliveries"
        ),
        Err(e) => error!(
            error = %format!("{e:#}"),
            "Input aborted, flushing accepted events and waiting for deliveries"
        ),
    }
    let stats = uplink.shutdown().await;
    (pumped, stats)
}

/// Feed every well-formed line into the uplink. Blank lines are ignored;
/// lines that are not UTF-8 or not a valid event are logged and skipped.
async fn pump_events<R>(mut reader: R, uplink: &Uplink) -> Result<PumpSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = PumpSummary::default();
    let mut line_no: u64 = 0;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .context("Failed to read input")?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!(line = line_no, "Skipping line that is not valid UTF-8");
            summary.skipped += 1;
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Event>(trimmed) {
            Ok(event) => {
                uplink.process(event);
                summary.accepted += 1;
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

fn list_pending(config: &UplinkConfig) -> Result<()> {
    let store = LocalFallbackStore::open(&config.fallback.dir).with_context(|| {
        format!(
            "Failed to open fallback directory {}",
            config.fallback.dir.display()
        )
    })?;

    let files = store.pending()?;
    if files.is_empty() {
        println!("No persisted batches in {}", store.dir().display());
        return Ok(());
    }

    for path in &files {
        match store.load(path) {
            Ok(batch) => println!("{}\t{} events", path.display(), batch.len()),
            Err(e) => println!("{}\tunreadable: {}", path.display(), e),
        }
    }
    println!("{} persisted batch(es)", files.len());
    Ok(())
}
