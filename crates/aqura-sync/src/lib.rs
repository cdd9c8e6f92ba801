//! # aqura-sync: Sync Agent for Aqura ERP Sync
//!
//! This crate provides the ERP → cloud pipeline: periodic extraction of
//! daily sales aggregates from the on-premise ERP database, idempotent
//! publication into the central cloud store, and durable offline queuing
//! across connectivity outages.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Agent Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncAgent (Main Orchestrator)               │  │
//! │  │                                                                  │  │
//! │  │  Fixed 10 s cycle: probe → drain on restore → today → yesterday │  │
//! │  │  One-shot backfill: walk the ERP's full date range               │  │
//! │  │  State machine: Idle / Syncing / BackfillRunning                 │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ ErpExtractor   │  │ CloudPublisher │  │  ConnectivityProbe     │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Date-scoped    │  │ Upsert keyed   │  │ Cheap read per cycle,  │    │
//! │  │ SI/SR voucher  │  │ on (branch_id, │  │ Offline→Online edge    │    │
//! │  │ aggregation    │  │ sale_date)     │  │ triggers queue drain   │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  OFFLINE FALLBACK:                                                     │
//! │  ─────────────────                                                     │
//! │  Publish fails / probe offline → aqura-db queue (SQLite, WAL)          │
//! │  Connectivity restored → drain oldest-first → mark synced → prune      │
//! │                                                                         │
//! │  STATUS EVENTS (to the host / UI collaborator):                        │
//! │  • info    - cycle progress, offline queuing                           │
//! │  • success - cycle/replay outcomes with counts and queue depth         │
//! │  • error   - ERP outages, store rejections, queue failures             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - Main `SyncAgent` orchestrator and state machine
//! - [`config`] - Agent configuration (branch, ERP, cloud, sync settings)
//! - [`error`] - Sync error taxonomy
//! - [`events`] - Outbound event stream (`SyncEventSink` seam)
//! - [`extractor`] - `SalesSource` seam + ERP implementation
//! - [`probe`] - Connectivity classification and edge detection
//! - [`publisher`] - `CloudStore` seam + PostgreSQL upsert implementation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use aqura_db::{Database, DbConfig};
//! use aqura_sync::{AgentConfig, CloudPublisher, ErpExtractor, NoOpSink, SyncAgent};
//!
//! let config = AgentConfig::load(None)?;
//! let db = Database::new(DbConfig::new(config.queue_path())).await?;
//! let erp = Arc::new(ErpExtractor::connect(&config.erp, config.branch_id()).await?);
//! let cloud = Arc::new(CloudPublisher::connect(&config.cloud).await?);
//!
//! let (mut agent, handle) = SyncAgent::new(config, erp, cloud, db, Arc::new(NoOpSink));
//! agent.run().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod extractor;
pub mod probe;
pub mod publisher;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use agent::{AgentState, AgentStatus, BackfillSummary, SyncAgent, SyncAgentHandle};
pub use config::AgentConfig;
pub use error::{SyncError, SyncResult};
pub use events::{ChannelSink, EventLevel, NoOpSink, SyncEvent, SyncEventSink};
pub use extractor::{ErpExtractor, SalesSource};
pub use probe::{Connectivity, ConnectivityProbe, ProbeReport};
pub use publisher::{CloudPublisher, CloudStore};
