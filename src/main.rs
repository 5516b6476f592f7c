//! Proximity Attendance CLI
//!
//! Runs the attendance server or computes attendance offline from a file.

use anyhow::Context;
use clap::{Parser, Subcommand};
use proximity_attendance::{
    audit::AuditLog,
    config::Config,
    core::{gap_threshold_from_secs, AttendanceStatus, IntervalPolicy, Session, Sighting},
    AttendanceEngine, MemoryStore, RecordMode, RecordSink, SessionStore, SightingStore, VERSION,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "proximity-attendance")]
#[command(version = VERSION)]
#[command(about = "Beacon-sighting attendance engine", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Directory for the store snapshot and audit log
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Compute attendance from a JSON file of a session and its sightings
    Compute {
        /// Input file: {"session": {...}, "sightings": [...]}
        #[arg(long, short)]
        input: PathBuf,

        /// Gap threshold in seconds (overrides configuration)
        #[arg(long)]
        gap_secs: Option<u64>,

        /// Sum merged intervals without clipping them to the session window
        #[arg(long)]
        unclipped: bool,

        /// Write records to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show stored sessions and audit counters
    Status,

    /// Show configuration
    Config,
}

/// Offline computation input.
#[derive(Debug, Deserialize)]
struct ComputeInput {
    session: Session,
    #[serde(default)]
    sightings: Vec<Sighting>,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
        } => cmd_serve(config, host, port, data_dir),
        Commands::Compute {
            input,
            gap_secs,
            unclipped,
            output,
        } => cmd_compute(config, &input, gap_secs, unclipped, output),
        Commands::Status => cmd_status(&config),
        Commands::Config => cmd_config(&config, cli.config.as_ref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env_overrides()?;
    Ok(config)
}

#[cfg(feature = "server")]
fn cmd_serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    use proximity_attendance::server::{serve, ServerConfig};

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(dir) = data_dir {
        config.data_path = dir;
    }
    config.ensure_directories()?;

    println!("Proximity Attendance v{VERSION}");
    println!("  Data directory: {:?}", config.data_path);
    println!("  Gap threshold: {}s", config.gap_threshold.as_secs());
    println!("  Interval policy: {:?}", config.interval_policy);
    println!("  Record mode: {:?}", config.record_mode);
    println!();
    println!("Press Ctrl+C to stop");

    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("Error setting Ctrl+C handler")?;

    let server_config = ServerConfig::from_config(&config)?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(serve(server_config, async move {
        let _ = stop_rx.recv().await;
    }))?;

    println!("Server stopped.");
    Ok(())
}

#[cfg(not(feature = "server"))]
fn cmd_serve(
    _config: Config,
    _host: Option<String>,
    _port: Option<u16>,
    _data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    anyhow::bail!("server feature not enabled at compile time")
}

fn cmd_compute(
    config: Config,
    input: &Path,
    gap_secs: Option<u64>,
    unclipped: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let content =
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input:?}"))?;
    let parsed: ComputeInput =
        serde_json::from_str(&content).with_context(|| format!("Invalid input in {input:?}"))?;

    let mut engine_config = config.engine_config()?;
    if let Some(secs) = gap_secs {
        engine_config.gap_threshold = gap_threshold_from_secs(secs)
            .with_context(|| format!("--gap-secs {secs} is out of range"))?;
    }
    if unclipped {
        engine_config.interval_policy = IntervalPolicy::Unclipped;
    }

    let session_id = parsed.session.id.clone();
    let store = Arc::new(MemoryStore::new(RecordMode::Append));
    store.upsert_session(parsed.session)?;
    for sighting in parsed.sightings {
        if sighting.device_id.trim().is_empty() {
            tracing::warn!(observed_at = %sighting.observed_at, "Skipping sighting with blank device id");
            continue;
        }
        store.record_sighting(&session_id, sighting)?;
    }

    let engine = AttendanceEngine::new(store.clone(), store.clone(), store.clone(), engine_config);
    let records = engine.compute(&session_id)?;

    let present = records
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();
    eprintln!(
        "Computed {} record(s) for session {}: {} present, {} absent",
        records.len(),
        session_id,
        present,
        records.len() - present
    );

    let json = serde_json::to_string_pretty(&records)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("Failed to write {path:?}"))?;
            eprintln!("Wrote records to {path:?}");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_status(config: &Config) -> anyhow::Result<()> {
    println!("Proximity Attendance Status");
    println!("===========================");
    println!();

    let store_path = config.store_path();
    if store_path.exists() {
        let store = MemoryStore::with_persistence(store_path, config.record_mode)?;
        println!("Stored data:");
        println!("  Sessions: {}", store.session_count());
        println!("  Attendance records: {}", store.record_count());
        for session in store.list_sessions()?.iter().take(5) {
            let records = store.records_for_session(&session.id)?;
            println!(
                "  - {} ({} to {}): {} record(s)",
                session.id,
                session.window_start.format("%Y-%m-%d %H:%M"),
                session.window_end.format("%H:%M"),
                records.len()
            );
        }
        println!();
    } else {
        println!("No stored data found in {:?}", config.data_path);
        println!();
    }

    let audit_path = config.audit_path();
    if audit_path.exists() {
        println!("{}", AuditLog::with_persistence(audit_path).summary());
    }

    Ok(())
}

fn cmd_config(config: &Config, path: Option<&PathBuf>) -> anyhow::Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    match path {
        Some(path) => println!("Config file: {path:?}"),
        None => println!("Config file: {:?}", Config::config_path()),
    }
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
