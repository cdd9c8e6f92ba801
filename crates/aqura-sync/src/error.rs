//! # Sync Error Types
//!
//! Error types for the ERP → cloud pipeline.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────────────────────────────┐  │
//! │  │  SourceUnavailable  │  │  Recovery: skip the date this cycle,    │  │
//! │  │  (ERP unreachable)  │  │  retry next cycle. NEVER fabricate a    │  │
//! │  │                     │  │  zero-valued aggregate.                 │  │
//! │  └─────────────────────┘  └─────────────────────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────────────────────────────┐  │
//! │  │ NetworkUnavailable  │  │  Recovery: enqueue locally, replay on   │  │
//! │  │ (cloud unreachable) │  │  the next Offline→Online transition.    │  │
//! │  └─────────────────────┘  └─────────────────────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────────────────────────────┐  │
//! │  │  RejectedByStore    │  │  Recovery: record last_error, bump      │  │
//! │  │  (constraint/schema)│  │  retry_count, warn. Bounded retries —   │  │
//! │  │                     │  │  never an unbounded poison pill.        │  │
//! │  └─────────────────────┘  └─────────────────────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────────────────────────────┐  │
//! │  │      QueueIo        │  │  Most severe: the queue is the last     │  │
//! │  │  (local disk)       │  │  fallback tier. Fatal for the cycle,    │  │
//! │  │                     │  │  logged loudly.                         │  │
//! │  └─────────────────────┘  └─────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all pipeline failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    /// ERP source unreachable or query timed out.
    #[error("ERP source unavailable: {0}")]
    SourceUnavailable(String),

    /// Cloud store unreachable (transport-level failure).
    #[error("Cloud store unreachable: {0}")]
    NetworkUnavailable(String),

    /// Cloud store rejected the write for structural reasons.
    #[error("Cloud store rejected record: {0}")]
    RejectedByStore(String),

    /// Local queue I/O failed. There is no further fallback tier.
    #[error("Offline queue failure: {0}")]
    QueueIo(#[from] aqura_db::DbError),

    /// Aggregate failed domain validation (corrupted queue row).
    #[error("Invalid aggregate: {0}")]
    InvalidAggregate(#[from] aqura_core::CoreError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid agent configuration.
    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Scheduling Errors
    // =========================================================================
    /// A sync pass or backfill is already in flight.
    #[error("Another sync pass is already running")]
    AlreadyRunning,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Classification
// =============================================================================

impl SyncError {
    /// Classifies an ERP-side sqlx failure.
    ///
    /// Everything from the source maps to `SourceUnavailable`: the extractor
    /// is read-only, so any failure means "no trustworthy figures this
    /// cycle" and the date is retried on the next tick.
    pub fn from_source(err: sqlx::Error) -> Self {
        SyncError::SourceUnavailable(err.to_string())
    }

    /// Classifies a cloud-side sqlx failure.
    ///
    /// Transport-level failures (connection, pool, TLS) mean the store is
    /// unreachable and the aggregate should be queued. Database-level
    /// failures mean the store received and refused the write — retrying
    /// without bound would turn the record into a poison pill.
    pub fn from_cloud(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => SyncError::RejectedByStore(db.to_string()),
            sqlx::Error::Io(io) => SyncError::NetworkUnavailable(io.to_string()),
            sqlx::Error::Tls(tls) => SyncError::NetworkUnavailable(tls.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                SyncError::NetworkUnavailable(err.to_string())
            }
            other => SyncError::NetworkUnavailable(other.to_string()),
        }
    }

    /// Returns true if the failed aggregate should be written to the
    /// offline queue for later replay.
    ///
    /// `RejectedByStore` is queued too: the record carries `last_error` and
    /// a bounded retry count, so the rejection stays visible to an operator
    /// instead of evaporating with the cycle.
    pub fn should_queue(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable(_) | SyncError::RejectedByStore(_)
        )
    }

    /// Returns true if the operation recovers automatically on a later
    /// cycle without operator involvement.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::SourceUnavailable(_) | SyncError::NetworkUnavailable(_)
        )
    }

    /// Returns true if this error threatens durability.
    ///
    /// A queue failure has no further fallback tier; the current cycle or
    /// backfill run must stop rather than drop aggregates silently.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::QueueIo(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_classification() {
        let err = SyncError::from_cloud(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, SyncError::NetworkUnavailable(_)));
        assert!(err.should_queue());
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_source_classification() {
        let err = SyncError::from_source(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, SyncError::SourceUnavailable(_)));
        assert!(err.is_retryable());
        // Source failures never queue: there is no aggregate to queue
        assert!(!err.should_queue());
    }

    #[test]
    fn test_queue_failures_are_fatal() {
        let err = SyncError::QueueIo(aqura_db::DbError::ConnectionFailed("disk full".into()));
        assert!(err.is_fatal());
        assert!(!err.should_queue());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rejected_is_queued_but_not_retryable() {
        let err = SyncError::RejectedByStore("numeric overflow".into());
        assert!(err.should_queue());
        assert!(!err.is_retryable());
    }
}
