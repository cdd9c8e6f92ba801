//! # Source Extractor
//!
//! Date-scoped aggregation queries against the on-premise ERP database.
//!
//! ## Extraction Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Extraction Flow                                    │
//! │                                                                         │
//! │  extract(2025-06-14)                                                   │
//! │       │                                                                 │
//! │       ├──► Query 1: sale vouchers (SI)                                 │
//! │       │    COUNT(*), SUM(GrandTotal), SUM(VatAmount),                  │
//! │       │    SUM(TotalDiscount)  WHERE DATE(TransactionDate) = ?         │
//! │       │                                                                 │
//! │       ├──► Query 2: return vouchers (SR)                               │
//! │       │    COUNT(*), SUM(GrandTotal), SUM(VatAmount)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DailySalesAggregate::from_totals ← nets computed here, once           │
//! │                                                                         │
//! │  NOTES:                                                                │
//! │  • Date-only comparison, not a timestamp range — avoids timezone drift │
//! │  • COALESCE to zero: a day with no vouchers is valid data              │
//! │  • Sums leave SQL as whole cents (× 100 cast to integer), so the       │
//! │    pipeline never touches floating point                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

use aqura_core::{DailySalesAggregate, Money, ReturnTotals, SaleTotals};

use crate::config::ErpConfig;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sales Source Trait
// =============================================================================

/// Seam over the ERP source so the scheduler can be exercised without a
/// live database.
#[async_trait]
pub trait SalesSource: Send + Sync {
    /// Extracts the aggregate for one calendar date.
    ///
    /// Read-only and side-effect-free: a pure function of ERP state at call
    /// time, safe to repeat for the same date. A day with no activity
    /// returns an all-zero aggregate; an unreachable ERP returns
    /// `SyncError::SourceUnavailable` and the caller must NOT substitute
    /// zeros.
    async fn extract(&self, date: NaiveDate) -> SyncResult<DailySalesAggregate>;

    /// Returns the full (min, max) date range of recorded sales, or `None`
    /// when the ERP holds no sales at all. Used by the historical backfill.
    async fn date_range(&self) -> SyncResult<Option<(NaiveDate, NaiveDate)>>;
}

// =============================================================================
// ERP Extractor
// =============================================================================

/// Production `SalesSource` over the ERP's transaction master table.
pub struct ErpExtractor {
    pool: MySqlPool,
    branch_id: i64,
    query_timeout: Duration,
}

impl ErpExtractor {
    /// Connects to the ERP database with a bounded pool.
    ///
    /// The pool is shared between the periodic cycle and backfill, which
    /// never run concurrently, so its size only caps in-cycle parallelism.
    pub async fn connect(config: &ErpConfig, branch_id: i64) -> SyncResult<Self> {
        info!(
            host = %config.host,
            database = %config.database,
            max_connections = config.max_connections,
            "Connecting to ERP source"
        );

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url())
            .await
            .map_err(SyncError::from_source)?;

        Ok(ErpExtractor {
            pool,
            branch_id,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        })
    }

    /// Closes the ERP connection pool. Called at agent shutdown.
    pub async fn close(&self) {
        info!("Closing ERP connection pool");
        self.pool.close().await;
    }

    /// Runs a query future under the configured timeout.
    ///
    /// A hung ERP server must look exactly like an unreachable one: the
    /// date is skipped this cycle and retried on the next tick.
    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
    ) -> SyncResult<T> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(SyncError::from_source),
            Err(_) => Err(SyncError::SourceUnavailable(format!(
                "ERP query timed out after {} seconds",
                self.query_timeout.as_secs()
            ))),
        }
    }

    /// Sums the day's sale vouchers.
    async fn sale_totals(&self, date: NaiveDate) -> SyncResult<SaleTotals> {
        let (bills, gross_cents, tax_cents, discount_cents) = self
            .with_timeout(
                sqlx::query_as::<_, (i64, i64, i64, i64)>(
                    r#"
                    SELECT
                        COUNT(*),
                        CAST(COALESCE(SUM(GrandTotal), 0) * 100 AS SIGNED),
                        CAST(COALESCE(SUM(VatAmount), 0) * 100 AS SIGNED),
                        CAST(COALESCE(SUM(TotalDiscount), 0) * 100 AS SIGNED)
                    FROM InvTransactionMaster
                    WHERE VoucherType = 'SI'
                    AND DATE(TransactionDate) = ?
                    "#,
                )
                .bind(date)
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(SaleTotals {
            bills,
            gross: Money::from_cents(gross_cents),
            tax: Money::from_cents(tax_cents),
            discount: Money::from_cents(discount_cents),
        })
    }

    /// Sums the day's return vouchers.
    async fn return_totals(&self, date: NaiveDate) -> SyncResult<ReturnTotals> {
        let (returns, amount_cents, tax_cents) = self
            .with_timeout(
                sqlx::query_as::<_, (i64, i64, i64)>(
                    r#"
                    SELECT
                        COUNT(*),
                        CAST(COALESCE(SUM(GrandTotal), 0) * 100 AS SIGNED),
                        CAST(COALESCE(SUM(VatAmount), 0) * 100 AS SIGNED)
                    FROM InvTransactionMaster
                    WHERE VoucherType = 'SR'
                    AND DATE(TransactionDate) = ?
                    "#,
                )
                .bind(date)
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(ReturnTotals {
            returns,
            amount: Money::from_cents(amount_cents),
            tax: Money::from_cents(tax_cents),
        })
    }
}

#[async_trait]
impl SalesSource for ErpExtractor {
    async fn extract(&self, date: NaiveDate) -> SyncResult<DailySalesAggregate> {
        debug!(%date, "Extracting daily totals from ERP");

        // The two queries share the bounded pool; issued in sequence so a
        // backfill can never starve the pool
        let sales = self.sale_totals(date).await?;
        let returns = self.return_totals(date).await?;

        Ok(DailySalesAggregate::from_totals(
            self.branch_id,
            date,
            sales,
            returns,
        ))
    }

    async fn date_range(&self) -> SyncResult<Option<(NaiveDate, NaiveDate)>> {
        let (first, last) = self
            .with_timeout(
                sqlx::query_as::<_, (Option<NaiveDate>, Option<NaiveDate>)>(
                    r#"
                    SELECT
                        MIN(DATE(TransactionDate)),
                        MAX(DATE(TransactionDate))
                    FROM InvTransactionMaster
                    WHERE VoucherType = 'SI'
                    "#,
                )
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(match (first, last) {
            (Some(first), Some(last)) => Some((first, last)),
            _ => None,
        })
    }
}
