//! # Aqura Sync Agent
//!
//! Headless agent that mirrors daily ERP sales aggregates into the central
//! cloud store.
//!
//! ## Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Agent Binary Modes                               │
//! │                                                                         │
//! │  aqura-agent                     Periodic loop: today + yesterday      │
//! │                                  every cycle, until ctrl-c             │
//! │                                                                         │
//! │  aqura-agent --backfill          One-shot: walk the ERP's full date    │
//! │                                  range, then exit                      │
//! │                                                                         │
//! │  aqura-agent --config <path>     Explicit config file location         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use aqura_db::{Database, DbConfig};
use aqura_sync::{
    AgentConfig, ChannelSink, CloudPublisher, ErpExtractor, EventLevel, SyncAgent, SyncEvent,
};

/// Command-line options. Two flags only, parsed by hand.
struct Options {
    config_path: Option<PathBuf>,
    backfill: bool,
}

fn parse_args() -> Result<Options, String> {
    let mut options = Options {
        config_path: None,
        backfill: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--backfill" => options.backfill = true,
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config requires a path".to_string())?;
                options.config_path = Some(PathBuf::from(path));
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(options)
}

/// Forwards sync events into the process log.
///
/// In production deployments the desktop shell subscribes to this stream
/// instead; headless runs get the same stream as log lines.
fn spawn_event_logger(mut rx: tokio::sync::mpsc::UnboundedReceiver<SyncEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.level {
                EventLevel::Info => info!(target: "sync_events", "{}", event.message),
                EventLevel::Success => info!(target: "sync_events", "{}", event.message),
                EventLevel::Error => warn!(target: "sync_events", "{}", event.message),
            }
        }
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Usage: aqura-agent [--config <path>] [--backfill]");
            return ExitCode::FAILURE;
        }
    };

    match run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(options: Options) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Aqura sync agent");

    // Load configuration
    let config = AgentConfig::load(options.config_path)?;
    info!(
        branch_id = config.branch_id(),
        branch_name = %config.branch.name,
        erp_host = %config.erp.host,
        "Configuration loaded"
    );

    // Open the offline queue first: without durable storage there is no
    // fallback tier, so this failure is fatal at startup
    let db = Database::new(DbConfig::new(config.queue_path())).await?;

    // Connect the ERP source and the cloud store. A cloud connect failure
    // is tolerated — the agent starts offline and queues until the probe
    // sees the store
    let erp = Arc::new(ErpExtractor::connect(&config.erp, config.branch_id()).await?);
    let cloud = Arc::new(CloudPublisher::connect(&config.cloud).await?);

    let (sink, events_rx) = ChannelSink::new();
    spawn_event_logger(events_rx);

    let (mut agent, handle) = SyncAgent::new(
        config,
        erp.clone(),
        cloud.clone(),
        db.clone(),
        Arc::new(sink),
    );

    if options.backfill {
        // One-shot historical sync, then exit
        let summary = agent.backfill().await?;
        info!(
            days_processed = summary.days_processed,
            days_failed = summary.days_failed,
            "Historical sync finished"
        );
    } else {
        // Periodic loop until ctrl-c
        let task = tokio::spawn(async move { agent.run().await });

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        handle.shutdown().await;
        task.await?;
    }

    // Timer stopped; release the pools together
    erp.close().await;
    cloud.close().await;
    db.close().await;

    info!("Aqura sync agent stopped");
    Ok(())
}
