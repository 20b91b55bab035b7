//! WolfSync - Synchronous Replication Durability Monitor
//!
//! Command line front end: configuration management and a local
//! simulation that drives partitions with simulated replicas.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::Rng;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfsync::config::{NodeConfig, WolfSyncConfig};
use wolfsync::durability::{DurabilityStats, Level, Requirements, Seqno};
use wolfsync::error::{Error, Result};
use wolfsync::partition::Partition;
use wolfsync::scanner::TimeoutScanner;

/// WolfSync - Synchronous Replication Durability Monitor
#[derive(Parser)]
#[command(name = "wolfsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfsync.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfsync.toml")]
        output: PathBuf,

        /// Node ID of the active node
        #[arg(long, default_value = "active")]
        node_id: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate,

    /// Show configuration and quorum information
    Info,

    /// Drive partitions with simulated replicas and print statistics
    Simulate {
        /// Override the number of mutations per partition
        #[arg(short, long)]
        writes: Option<u64>,

        /// Durability level by wire code (1 majority, 2 majority and persist
        /// on active, 3 persist to majority); defaults to the config
        #[arg(long)]
        level: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The config file may not exist yet (init), fall back to defaults for logging
    let logging = WolfSyncConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    init_logging(level, &logging.format);

    match cli.command {
        Commands::Init { output, node_id, force } => run_init(output, node_id, force),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Simulate { writes, level } => run_simulate(cli.config, writes, level).await,
    }
}

/// Initialize logging
///
/// Logs go to stderr so that `simulate` output stays parseable.
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Write a configuration file with default settings
fn run_init(output: PathBuf, node_id: String, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists, use --force to overwrite",
            output.display()
        )));
    }

    let config = WolfSyncConfig {
        node: NodeConfig { id: node_id },
        ..WolfSyncConfig::default()
    };
    config.validate()?;

    let content = format!(
        "# WolfSync Configuration\n# Generated configuration file\n\n{}",
        config.to_toml()?
    );
    std::fs::write(&output, content)?;

    println!("Configuration file created: {}", output.display());
    println!("\nEdit the replica list and durability settings as needed.");
    println!("Then run: wolfsync simulate --config {}", output.display());
    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfSyncConfig::from_file(&config_path) {
        Ok(config) => {
            let topology = config.simulation.topology();
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!(
                "  Default Level: {} (code {})",
                config.durability.default_level,
                config.durability.default_level.code()
            );
            println!("  Replicas: {}", topology);
            println!("  Majority: {}", topology.majority());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show configuration and quorum information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfSyncConfig::from_file(&config_path)?;
    let topology = config.simulation.topology();

    println!("WolfSync Node Information");
    println!("=========================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!();
    println!("Durability Configuration:");
    println!(
        "  Default Level:  {} (code {})",
        config.durability.default_level,
        config.durability.default_level.code()
    );
    println!("  Timeout:        {} ms", config.durability.default_timeout_ms);
    println!("  Scan Interval:  {} ms", config.durability.timeout_scan_interval_ms);
    println!("  Max Replicas:   {}", config.durability.max_replicas);
    println!();
    println!("Topology:");
    println!("  Replicas:       {}", topology);
    println!("  Nodes:          {}", topology.size());
    println!("  Majority:       {}", topology.majority());
    println!("  Quorum:         {}", if topology.is_quorum_reachable() { "reachable" } else { "unreachable" });
    println!();
    println!("Simulation:");
    println!("  Partitions:     {}", config.simulation.partitions);
    println!("  Writes:         {}", config.simulation.writes);
    println!("  Ack Delay:      0-{} ms", config.simulation.max_ack_delay_ms);
    println!("  Durable Ratio:  {}", config.simulation.durable_ratio);

    Ok(())
}

/// Load the config file, or defaults when it does not exist
fn load_config(config_path: &Path) -> Result<WolfSyncConfig> {
    if config_path.exists() {
        WolfSyncConfig::from_file(config_path)
    } else {
        tracing::info!("{} not found, using default configuration", config_path.display());
        Ok(WolfSyncConfig::default())
    }
}

/// Run the simulation and print per-partition statistics as JSON
async fn run_simulate(config_path: PathBuf, writes: Option<u64>, level: Option<u8>) -> Result<()> {
    let mut config = load_config(&config_path)?;
    if let Some(writes) = writes {
        config.simulation.writes = writes;
    }
    let level = match level {
        Some(code) => Level::try_from(code)?,
        None => config.durability.default_level,
    };

    let topology = config.simulation.topology();
    let mut partitions = Vec::with_capacity(config.simulation.partitions as usize);
    for id in 0..config.simulation.partitions {
        partitions.push(Partition::new(
            id,
            config.node.id.clone(),
            topology.clone(),
            &config.durability,
        )?);
    }

    tracing::info!(
        "Simulating {} partitions, {} writes each at {}, replicas {}",
        partitions.len(),
        config.simulation.writes,
        level,
        topology
    );

    let scanner = Arc::new(TimeoutScanner::new(
        partitions.clone(),
        config.durability.timeout_scan_interval(),
    ));
    let scanner_handle = tokio::spawn({
        let scanner = scanner.clone();
        async move { scanner.run().await }
    });

    let max_delay = config.simulation.max_ack_delay_ms;
    let mut replica_handles = Vec::new();
    let mut streams: Vec<Vec<mpsc::UnboundedSender<Seqno>>> = Vec::new();

    for partition in &partitions {
        let mut senders = Vec::new();
        for replica in topology.defined() {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            replica_handles.push(tokio::spawn(run_replica(
                partition.clone(),
                replica.to_string(),
                rx,
                max_delay,
            )));
        }
        streams.push(senders);
    }

    for i in 0..config.simulation.writes {
        for (partition, senders) in partitions.iter().zip(&streams) {
            let durable = rand::thread_rng().gen_bool(config.simulation.durable_ratio);
            let requirements = durable.then(|| Requirements::new(level));

            let key = format!("key-{}", i);
            let seqno = partition.set(&key, i.to_le_bytes().to_vec(), requirements)?;
            for tx in senders {
                // A closed stream means the replica task ended; its acks are lost
                let _ = tx.send(seqno);
            }
        }
        tokio::task::yield_now().await;
    }

    drop(streams);
    for handle in replica_handles {
        handle
            .await
            .map_err(|e| Error::Internal(format!("replica task failed: {}", e)))?;
    }

    // Anything still tracked can only resolve through the scanner
    while partitions.iter().any(|p| p.monitor().num_tracked() > 0) {
        tokio::time::sleep(config.durability.timeout_scan_interval()).await;
    }

    scanner.stop().await;
    scanner_handle
        .await
        .map_err(|e| Error::Internal(format!("timeout scanner failed: {}", e)))?;

    let stats: Vec<DurabilityStats> = partitions.iter().map(|p| p.stats()).collect();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Simulated replica: acknowledges every replicated seqno after a random delay
async fn run_replica(
    partition: Arc<Partition>,
    replica: String,
    mut stream: mpsc::UnboundedReceiver<Seqno>,
    max_delay_ms: u64,
) {
    while let Some(seqno) = stream.recv().await {
        let delay = rand::thread_rng().gen_range(0..=max_delay_ms);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        // Replicas persist as they receive, so memory and disk advance together
        match partition.seqno_acknowledged(&replica, seqno, seqno) {
            Ok(()) => {}
            Err(e) if e.is_operational() => {
                tracing::trace!("Partition {}: {}", partition.id(), e)
            }
            Err(e) => {
                tracing::warn!("Partition {}: ack from {} failed: {}", partition.id(), replica, e)
            }
        }
    }
}
