//! # Offline Queue Repository
//!
//! Manages the durable queue of aggregates awaiting cloud publication.
//!
//! ## The Queue Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Offline Queue Lifecycle                              │
//! │                                                                         │
//! │  CLOUD PUBLISH FAILS (offline or error)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO sync_queue (... synced=0, retry_count=0)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            DRAIN (on Offline→Online transition)                 │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * FROM sync_queue WHERE synced = 0                  │   │
//! │  │     ORDER BY created_at, id  (oldest first)                    │   │
//! │  │                                                                 │   │
//! │  │  2. For each record:                                           │   │
//! │  │     a. Replay upsert to cloud store                            │   │
//! │  │     b. On success: UPDATE ... SET synced = 1                   │   │
//! │  │     c. On failure: UPDATE ... SET retry_count += 1,            │   │
//! │  │                    last_error = ?                              │   │
//! │  │                                                                 │   │
//! │  │  3. DELETE synced rows older than the retention window         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Unsynced rows are NEVER deleted, regardless of age or retries       │
//! │  • synced flips false→true exactly once, never back                    │
//! │  • Replay order is chronological for readable logs; correctness        │
//! │    never depends on it (publish is idempotent per key)                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use aqura_core::{DailySalesAggregate, QueueRecord};

/// Repository for offline queue operations.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
    /// Creates a new QueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QueueRepository { pool }
    }

    /// Queues an aggregate that could not be published.
    ///
    /// Net fields are stored exactly as extracted; the queue never
    /// recomputes them.
    ///
    /// ## Returns
    /// The stored record, with its assigned id.
    pub async fn enqueue(&self, aggregate: &DailySalesAggregate) -> DbResult<QueueRecord> {
        let now = Utc::now();

        debug!(
            branch_id = aggregate.branch_id,
            sale_date = %aggregate.sale_date,
            "Queuing aggregate for later sync"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO sync_queue (
                branch_id, sale_date, total_bills, total_returns, net_bills,
                gross_amount, tax_amount, discount_amount,
                return_amount, return_tax, net_amount, net_tax,
                created_at, synced, retry_count, last_error
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11, ?12,
                ?13, 0, 0, NULL
            )
            "#,
        )
        .bind(aggregate.branch_id)
        .bind(aggregate.sale_date)
        .bind(aggregate.total_bills)
        .bind(aggregate.total_returns)
        .bind(aggregate.net_bills)
        .bind(aggregate.gross_amount)
        .bind(aggregate.tax_amount)
        .bind(aggregate.discount_amount)
        .bind(aggregate.return_amount)
        .bind(aggregate.return_tax)
        .bind(aggregate.net_amount)
        .bind(aggregate.net_tax)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(QueueRecord {
            id: result.last_insert_rowid(),
            branch_id: aggregate.branch_id,
            sale_date: aggregate.sale_date,
            total_bills: aggregate.total_bills,
            total_returns: aggregate.total_returns,
            net_bills: aggregate.net_bills,
            gross_amount: aggregate.gross_amount,
            tax_amount: aggregate.tax_amount,
            discount_amount: aggregate.discount_amount,
            return_amount: aggregate.return_amount,
            return_tax: aggregate.return_tax,
            net_amount: aggregate.net_amount,
            net_tax: aggregate.net_tax,
            created_at: now,
            synced: false,
            retry_count: 0,
            last_error: None,
        })
    }

    /// Returns all records awaiting publication, oldest first.
    ///
    /// The id tiebreaker keeps replay order deterministic when several
    /// records share an enqueue timestamp.
    pub async fn pending(&self) -> DbResult<Vec<QueueRecord>> {
        let records = sqlx::query_as::<_, QueueRecord>(
            r#"
            SELECT
                id, branch_id, sale_date, total_bills, total_returns, net_bills,
                gross_amount, tax_amount, discount_amount,
                return_amount, return_tax, net_amount, net_tax,
                created_at, synced, retry_count, last_error
            FROM sync_queue
            WHERE synced = 0
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Marks a record as successfully replayed.
    ///
    /// Clears `last_error`; `synced` flips false→true exactly once (nothing
    /// ever writes it back to false).
    pub async fn mark_synced(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue SET
                synced = 1,
                last_error = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(id));
        }

        Ok(())
    }

    /// Records a failed replay attempt.
    ///
    /// `retry_count` is only ever incremented, so it is non-decreasing
    /// across the record's lifetime.
    pub async fn mark_failed(&self, id: i64, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue SET
                retry_count = retry_count + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(id));
        }

        Ok(())
    }

    /// Counts records awaiting publication.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Deletes synced records older than the retention window.
    ///
    /// Unsynced records are never touched, regardless of age or retry
    /// count — the queue guarantees no silent data loss.
    ///
    /// ## Returns
    /// Number of deleted records.
    pub async fn prune(&self, retention_days: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(retention_days as i64);

        let result = sqlx::query(
            r#"
            DELETE FROM sync_queue
            WHERE synced = 1
            AND created_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!(deleted, retention_days, "Pruned synced queue records");
        }

        Ok(deleted)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use aqura_core::{Money, ReturnTotals, SaleTotals};
    use chrono::NaiveDate;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn aggregate_for(day: u32) -> DailySalesAggregate {
        let sales = SaleTotals {
            bills: 10 + day as i64,
            gross: Money::from_cents(100_000 + day as i64),
            tax: Money::from_cents(15_000),
            discount: Money::from_cents(2_000),
        };
        let returns = ReturnTotals {
            returns: 1,
            amount: Money::from_cents(5_000),
            tax: Money::from_cents(750),
        };
        DailySalesAggregate::from_totals(
            4,
            NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            sales,
            returns,
        )
    }

    #[tokio::test]
    async fn test_enqueue_and_pending() {
        let db = test_db().await;
        let queue = db.queue();

        let record = queue.enqueue(&aggregate_for(1)).await.unwrap();
        assert!(!record.synced);
        assert_eq!(record.retry_count, 0);
        assert!(record.last_error.is_none());

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, record.id);
        assert_eq!(pending[0].net_bills, record.net_bills);
        assert_eq!(pending[0].net_amount, record.net_amount);
    }

    #[tokio::test]
    async fn test_pending_is_oldest_first() {
        let db = test_db().await;
        let queue = db.queue();

        let first = queue.enqueue(&aggregate_for(1)).await.unwrap();
        let second = queue.enqueue(&aggregate_for(2)).await.unwrap();
        let third = queue.enqueue(&aggregate_for(3)).await.unwrap();

        let pending = queue.pending().await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[tokio::test]
    async fn test_mark_synced_removes_from_pending() {
        let db = test_db().await;
        let queue = db.queue();

        let record = queue.enqueue(&aggregate_for(1)).await.unwrap();
        assert_eq!(queue.count_pending().await.unwrap(), 1);

        queue.mark_synced(record.id).await.unwrap();
        assert_eq!(queue.count_pending().await.unwrap(), 0);
        assert!(queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_synced_unknown_id() {
        let db = test_db().await;
        assert!(matches!(
            db.queue().mark_synced(999).await,
            Err(DbError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_mark_failed_is_monotonic() {
        let db = test_db().await;
        let queue = db.queue();

        let record = queue.enqueue(&aggregate_for(1)).await.unwrap();

        queue.mark_failed(record.id, "cloud unreachable").await.unwrap();
        queue.mark_failed(record.id, "still unreachable").await.unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending[0].retry_count, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("still unreachable"));
        // Failed records stay pending
        assert!(!pending[0].synced);
    }

    #[tokio::test]
    async fn test_prune_never_touches_unsynced() {
        let db = test_db().await;
        let queue = db.queue();

        let kept = queue.enqueue(&aggregate_for(1)).await.unwrap();
        let gone = queue.enqueue(&aggregate_for(2)).await.unwrap();
        queue.mark_synced(gone.id).await.unwrap();

        // Zero-day retention: every synced record is already past the window
        let deleted = queue.prune(0).await.unwrap();
        assert_eq!(deleted, 1);

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, kept.id);
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_synced() {
        let db = test_db().await;
        let queue = db.queue();

        let record = queue.enqueue(&aggregate_for(1)).await.unwrap();
        queue.mark_synced(record.id).await.unwrap();

        // Freshly synced record is inside the 7-day window
        let deleted = queue.prune(7).await.unwrap();
        assert_eq!(deleted, 0);
    }
}
