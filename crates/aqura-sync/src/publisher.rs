//! # Cloud Publisher
//!
//! Idempotent upserts of daily aggregates into the cloud store.
//!
//! ## Upsert Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Why Upsert, Not Insert                             │
//! │                                                                         │
//! │  The queue may replay a day out of order, or more than once after a    │
//! │  crash. "Yesterday" is re-published every cycle to absorb late ERP     │
//! │  corrections. Both are safe because the write is:                      │
//! │                                                                         │
//! │  INSERT INTO erp_daily_sales (...)                                     │
//! │  ON CONFLICT (branch_id, sale_date) DO UPDATE SET <all other fields>   │
//! │                                                                         │
//! │  Replaying aggregate A any number of times, in any order relative to   │
//! │  other dates, converges to the same final row.                         │
//! │                                                                         │
//! │  ERROR SPLIT:                                                          │
//! │  • transport failure  → NetworkUnavailable → queue and retry           │
//! │  • store rejection    → RejectedByStore    → record, warn, cap retries │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

use aqura_core::DailySalesAggregate;

use crate::config::CloudConfig;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Cloud Store Trait
// =============================================================================

/// Seam over the cloud store so the scheduler can be exercised without a
/// live database.
#[async_trait]
pub trait CloudStore: Send + Sync {
    /// Upserts one aggregate, keyed on `(branch_id, sale_date)`.
    ///
    /// Existing rows are overwritten field-by-field and `last_sync_at` is
    /// refreshed; absent keys are inserted. Idempotent per key.
    async fn upsert(&self, aggregate: &DailySalesAggregate) -> SyncResult<()>;

    /// Cheap connectivity check — a lightweight read, not a sync attempt,
    /// so it can run every cycle without load concerns.
    async fn ping(&self) -> bool;
}

// =============================================================================
// Cloud Publisher
// =============================================================================

/// Production `CloudStore` over the central PostgreSQL store.
pub struct CloudPublisher {
    pool: PgPool,
}

impl CloudPublisher {
    /// Connects to the cloud store.
    ///
    /// The pool stays tiny: the agent issues one upsert at a time from a
    /// single loop.
    pub async fn connect(config: &CloudConfig) -> SyncResult<Self> {
        info!("Connecting to cloud store");

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(SyncError::from_cloud)?;

        Ok(CloudPublisher { pool })
    }

    /// Closes the cloud connection pool. Called at agent shutdown.
    pub async fn close(&self) {
        info!("Closing cloud connection pool");
        self.pool.close().await;
    }
}

#[async_trait]
impl CloudStore for CloudPublisher {
    async fn upsert(&self, aggregate: &DailySalesAggregate) -> SyncResult<()> {
        // A corrupted queue row must not reach the cloud store
        aggregate.validate()?;

        debug!(
            branch_id = aggregate.branch_id,
            sale_date = %aggregate.sale_date,
            net_bills = aggregate.net_bills,
            "Upserting daily aggregate"
        );

        // Money travels as whole cents; the NUMERIC(12,2) conversion
        // happens inside the statement
        sqlx::query(
            r#"
            INSERT INTO erp_daily_sales (
                branch_id, sale_date, total_bills, total_returns, net_bills,
                gross_amount, tax_amount, discount_amount,
                return_amount, return_tax, net_amount, net_tax,
                last_sync_at
            ) VALUES (
                $1, $2, $3, $4, $5,
                ROUND($6::numeric / 100, 2), ROUND($7::numeric / 100, 2),
                ROUND($8::numeric / 100, 2), ROUND($9::numeric / 100, 2),
                ROUND($10::numeric / 100, 2), ROUND($11::numeric / 100, 2),
                ROUND($12::numeric / 100, 2),
                $13
            )
            ON CONFLICT (branch_id, sale_date) DO UPDATE SET
                total_bills = EXCLUDED.total_bills,
                total_returns = EXCLUDED.total_returns,
                net_bills = EXCLUDED.net_bills,
                gross_amount = EXCLUDED.gross_amount,
                tax_amount = EXCLUDED.tax_amount,
                discount_amount = EXCLUDED.discount_amount,
                return_amount = EXCLUDED.return_amount,
                return_tax = EXCLUDED.return_tax,
                net_amount = EXCLUDED.net_amount,
                net_tax = EXCLUDED.net_tax,
                last_sync_at = EXCLUDED.last_sync_at
            "#,
        )
        .bind(aggregate.branch_id)
        .bind(aggregate.sale_date)
        .bind(aggregate.total_bills)
        .bind(aggregate.total_returns)
        .bind(aggregate.net_bills)
        .bind(aggregate.gross_amount.cents())
        .bind(aggregate.tax_amount.cents())
        .bind(aggregate.discount_amount.cents())
        .bind(aggregate.return_amount.cents())
        .bind(aggregate.return_tax.cents())
        .bind(aggregate.net_amount.cents())
        .bind(aggregate.net_tax.cents())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(SyncError::from_cloud)?;

        Ok(())
    }

    async fn ping(&self) -> bool {
        // Lightweight read against a small table, not a full sync attempt
        sqlx::query("SELECT id FROM branches LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .is_ok()
    }
}
