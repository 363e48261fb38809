//! Replog - Primary-Backup Replication Log
//!
//! Runs a master or slave node. The role comes from the configuration file.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use replog::api::{HttpServer, MasterState, SlaveState};
use replog::config::{ReplogConfig, Role, StorageBackend};
use replog::error::{Error, Result};
use replog::log::{open_store, LogStore};
use replog::network::{HttpBroadcaster, HttpMasterClient};
use replog::replication::{Master, Slave};

/// Replog - Primary-Backup Replication Log
#[derive(Parser)]
#[command(name = "replog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "replog.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start,

    /// Initialize a new configuration file
    Init {
        /// Role of the node to configure
        #[arg(long, value_parser = parse_role)]
        role: Role,

        /// Output path for configuration file
        #[arg(short, long, default_value = "replog.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

fn parse_role(value: &str) -> std::result::Result<Role, String> {
    match value {
        "master" => Ok(Role::Master),
        "slave" => Ok(Role::Slave),
        other => Err(format!("unknown role '{}', expected master or slave", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = match ReplogConfig::from_file(&cli.config) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Failed to load configuration from {:?}: {}", cli.config, e);
                    return Err(e);
                }
            };
            let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
            init_logging(level, &config.logging.format);
            run_start(config).await
        }
        Commands::Init { role, output } => run_init(role, output),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start the node in its configured role
async fn run_start(config: ReplogConfig) -> Result<()> {
    tracing::info!("Starting replog {} node...", config.node.role);

    let repository = match open_store(&config.storage) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Failed to open log storage: {}", e);
            return Err(e);
        }
    };
    tracing::info!("Log opened, last sequence: {}", repository.last_sequence().await);

    match config.node.role {
        Role::Master => run_master(&config, repository).await?,
        Role::Slave => run_slave(&config, repository).await?,
    }

    tracing::info!("Replog shutdown complete");
    Ok(())
}

async fn run_master(config: &ReplogConfig, repository: Arc<dyn LogStore>) -> Result<()> {
    let master_config = config.master_config()?;
    let broadcaster = HttpBroadcaster::new(&master_config.peers, master_config.request_timeout())?;
    let master = Arc::new(Master::new(
        repository,
        master_config.settings(),
        Arc::new(broadcaster),
    )?);
    tracing::info!("Replicating to {} slaves", master_config.peers.len());

    let state = Arc::new(MasterState::new(
        Arc::clone(&master),
        config.replica_id(),
        master_config.peers.clone(),
    ));
    let server_shutdown = CancellationToken::new();
    let mut server = tokio::spawn(
        HttpServer::master(config.node.bind_address.clone(), state).start(server_shutdown.clone()),
    );

    tokio::select! {
        result = &mut server => return join_server(result),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // Release waiting writers before draining their requests
    master.shutdown();
    server_shutdown.cancel();
    join_server(server.await)
}

async fn run_slave(config: &ReplogConfig, repository: Arc<dyn LogStore>) -> Result<()> {
    let slave_config = config.slave_config()?;
    let client = HttpMasterClient::new(&slave_config.master_address, slave_config.request_timeout())?;
    tracing::info!("Following master at {}", client.base_url());

    let slave = Arc::new(Slave::new(
        repository,
        Arc::new(client),
        slave_config.settings(),
        config.replica_id(),
    )?);
    tracing::info!("Replica id: {}", slave.replica_id());

    let state = Arc::new(SlaveState::new(Arc::clone(&slave)));
    let server_shutdown = CancellationToken::new();
    let mut server = tokio::spawn(
        HttpServer::slave(config.node.bind_address.clone(), state).start(server_shutdown.clone()),
    );

    slave.start().await?;

    let result = tokio::select! {
        result = &mut server => Some(join_server(result)),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            None
        }
    };

    slave.stop().await;
    match result {
        Some(result) => result,
        None => {
            server_shutdown.cancel();
            join_server(server.await)
        }
    }
}

fn join_server(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!("HTTP server failed: {}", e);
            Err(e)
        }
        Err(e) => Err(Error::InvalidState(format!("HTTP server task failed: {}", e))),
    }
}

/// Initialize a new configuration file
fn run_init(role: Role, output: PathBuf) -> Result<()> {
    std::fs::write(&output, ReplogConfig::sample(role))?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure storage and replication peers.");
    println!("Then start with: replog --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match ReplogConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Role: {}", config.node.role);
            println!("  Bind Address: {}", config.node.bind_address);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = ReplogConfig::from_file(&config_path)?;

    println!("Replog Node Information");
    println!("=======================");
    println!();
    println!("Role:             {}", config.node.role);
    println!("Bind Address:     {}", config.node.bind_address);
    if !config.node.replica_id.is_empty() {
        println!("Replica ID:       {}", config.node.replica_id);
    }
    println!();
    println!("Storage:");
    match config.storage.backend {
        StorageBackend::Memory => println!("  Backend:        memory"),
        StorageBackend::File => {
            println!("  Backend:        file");
            println!("  Path:           {}", config.storage.path.display());
            println!("  Fsync:          {}", config.storage.fsync);
        }
    }
    println!();

    if let Some(master) = &config.master {
        println!("Master Configuration:");
        println!("  Peers:          {:?}", master.peers);
        println!("  Ack Wait:       {} ms", master.min_ack_wait_ms);
        println!("  Timeout:        {} ms", master.request_timeout_ms);
    }
    if let Some(slave) = &config.slave {
        println!("Slave Configuration:");
        println!("  Master:         {}", slave.master_address);
        println!("  Queue Capacity: {}", slave.queue_capacity);
        println!("  Poll Interval:  {} ms", slave.poll_interval_ms);
        println!("  Retry Backoff:  {} ms", slave.retry_backoff_ms);
    }

    Ok(())
}
