//! # aqura-db: Durable Offline Queue
//!
//! SQLite-backed store that keeps daily aggregates safe while the cloud
//! store is unreachable. Records survive process restarts and machine
//! reboots — the agent may run unattended for days while offline.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          aqura-db                                       │
//! │                                                                         │
//! │  pool.rs         DbConfig + Database (WAL SQLite pool, migrations)     │
//! │  migrations.rs   Embedded schema migrations                            │
//! │  repository/     QueueRepository                                       │
//! │                    enqueue / pending / mark_synced / mark_failed /     │
//! │                    count_pending / prune                               │
//! │  error.rs        DbError - the no-further-fallback failure tier        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use aqura_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("/var/lib/aqura/offline.db")).await?;
//! let queue = db.queue();
//!
//! queue.enqueue(&aggregate).await?;
//! for record in queue.pending().await? {
//!     // replay...
//! }
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// Re-exports for convenient access
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::QueueRepository;
