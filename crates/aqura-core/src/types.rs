//! # Domain Types
//!
//! The unit of synchronization and its durable queue wrapper.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Where These Types Live                               │
//! │                                                                         │
//! │  ERP source ──► SaleTotals + ReturnTotals                              │
//! │                       │                                                 │
//! │                       ▼                                                 │
//! │            DailySalesAggregate::from_totals  ← nets computed HERE,     │
//! │                       │                         exactly once           │
//! │          ┌────────────┴────────────┐                                   │
//! │          ▼                         ▼                                   │
//! │   Cloud upsert              QueueRecord (offline)                      │
//! │   (publish path)            replayed later, nets carried verbatim     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Extraction Totals
// =============================================================================

/// Totals summed over one day's sale vouchers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    /// Number of sale bills for the day.
    pub bills: i64,
    /// Summed grand total of all sale bills.
    pub gross: Money,
    /// Summed tax over all sale bills.
    pub tax: Money,
    /// Summed discount over all sale bills.
    pub discount: Money,
}

/// Totals summed over one day's return vouchers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnTotals {
    /// Number of return vouchers for the day.
    pub returns: i64,
    /// Summed grand total of all returns.
    pub amount: Money,
    /// Summed tax over all returns.
    pub tax: Money,
}

// =============================================================================
// Daily Sales Aggregate
// =============================================================================

/// The per-branch, per-date rollup of sales and returns.
///
/// ## Natural Key
/// `(branch_id, sale_date)` is unique in the cloud store. Re-publishing the
/// same key overwrites all non-key fields (upsert), never duplicates.
///
/// ## Net Invariants
/// - `net_bills = total_bills - total_returns`
/// - `net_amount = gross_amount - return_amount`
/// - `net_tax = tax_amount - return_tax`
///
/// The nets are computed by [`DailySalesAggregate::from_totals`] and carried
/// verbatim everywhere downstream — the queue and the publisher never
/// recompute them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySalesAggregate {
    /// Originating branch; part of the natural key.
    pub branch_id: i64,

    /// Business date; part of the natural key. No time component.
    pub sale_date: NaiveDate,

    /// Count of sale bills.
    pub total_bills: i64,

    /// Count of return vouchers.
    pub total_returns: i64,

    /// `total_bills - total_returns`.
    pub net_bills: i64,

    /// Summed grand total of sale bills.
    pub gross_amount: Money,

    /// Summed tax of sale bills.
    pub tax_amount: Money,

    /// Summed discount of sale bills.
    pub discount_amount: Money,

    /// Summed grand total of returns.
    pub return_amount: Money,

    /// Summed tax of returns.
    pub return_tax: Money,

    /// `gross_amount - return_amount`.
    pub net_amount: Money,

    /// `tax_amount - return_tax`.
    pub net_tax: Money,

    /// Set at publish time, not at extraction time.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl DailySalesAggregate {
    /// Builds an aggregate from extracted totals, computing the net fields.
    ///
    /// This is the ONLY place the net invariants are evaluated.
    ///
    /// ## Example
    /// ```rust
    /// use aqura_core::money::Money;
    /// use aqura_core::types::{DailySalesAggregate, ReturnTotals, SaleTotals};
    ///
    /// let sales = SaleTotals {
    ///     bills: 120,
    ///     gross: Money::from_cents(500_000),
    ///     tax: Money::from_cents(75_000),
    ///     discount: Money::from_cents(12_000),
    /// };
    /// let returns = ReturnTotals {
    ///     returns: 3,
    ///     amount: Money::from_cents(9_000),
    ///     tax: Money::from_cents(1_350),
    /// };
    ///
    /// let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
    /// let agg = DailySalesAggregate::from_totals(4, date, sales, returns);
    /// assert_eq!(agg.net_bills, 117);
    /// assert_eq!(agg.net_amount.cents(), 491_000);
    /// assert_eq!(agg.net_tax.cents(), 73_650);
    /// ```
    pub fn from_totals(
        branch_id: i64,
        sale_date: NaiveDate,
        sales: SaleTotals,
        returns: ReturnTotals,
    ) -> Self {
        DailySalesAggregate {
            branch_id,
            sale_date,
            total_bills: sales.bills,
            total_returns: returns.returns,
            net_bills: sales.bills - returns.returns,
            gross_amount: sales.gross,
            tax_amount: sales.tax,
            discount_amount: sales.discount,
            return_amount: returns.amount,
            return_tax: returns.tax,
            net_amount: sales.gross - returns.amount,
            net_tax: sales.tax - returns.tax,
            last_sync_at: None,
        }
    }

    /// Builds an all-zero aggregate for a day with no ERP activity.
    ///
    /// A branch with no sales on a given day is valid data, not an error.
    pub fn empty(branch_id: i64, sale_date: NaiveDate) -> Self {
        Self::from_totals(
            branch_id,
            sale_date,
            SaleTotals::default(),
            ReturnTotals::default(),
        )
    }

    /// Validates the count fields.
    ///
    /// The raw counts come from SQL `COUNT(*)` so they can only go negative
    /// through a corrupted queue row; a replay must not push garbage into
    /// the cloud store.
    pub fn validate(&self) -> CoreResult<()> {
        if self.total_bills < 0 {
            return Err(CoreError::NegativeCount {
                field: "total_bills",
                value: self.total_bills,
            });
        }
        if self.total_returns < 0 {
            return Err(CoreError::NegativeCount {
                field: "total_returns",
                value: self.total_returns,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Queue Record
// =============================================================================

/// A durable wrapper around one aggregate awaiting publication.
///
/// ## Lifecycle
/// ```text
/// publish fails ──► INSERT (synced=0, retry_count=0)
///        │
///        ▼
/// replay fails  ──► retry_count += 1, last_error = message
///        │
///        ▼
/// replay ok     ──► synced = 1   (flips exactly once, never back)
///        │
///        ▼
/// prune         ──► DELETE only when synced AND older than retention
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct QueueRecord {
    /// Local auto-increment id.
    pub id: i64,
    pub branch_id: i64,
    pub sale_date: NaiveDate,
    pub total_bills: i64,
    pub total_returns: i64,
    pub net_bills: i64,
    pub gross_amount: Money,
    pub tax_amount: Money,
    pub discount_amount: Money,
    pub return_amount: Money,
    pub return_tax: Money,
    pub net_amount: Money,
    pub net_tax: Money,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// True once the record has been replayed successfully.
    pub synced: bool,
    /// Number of failed replay attempts.
    pub retry_count: i64,
    /// Message from the most recent failed replay attempt.
    pub last_error: Option<String>,
}

impl QueueRecord {
    /// Rebuilds the aggregate for replay.
    ///
    /// Net fields are carried from the stored row verbatim — the invariants
    /// were evaluated at extraction time and must not be recomputed here.
    pub fn to_aggregate(&self) -> DailySalesAggregate {
        DailySalesAggregate {
            branch_id: self.branch_id,
            sale_date: self.sale_date,
            total_bills: self.total_bills,
            total_returns: self.total_returns,
            net_bills: self.net_bills,
            gross_amount: self.gross_amount,
            tax_amount: self.tax_amount,
            discount_amount: self.discount_amount,
            return_amount: self.return_amount,
            return_tax: self.return_tax,
            net_amount: self.net_amount,
            net_tax: self.net_tax,
            last_sync_at: None,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_net_invariants() {
        let sales = SaleTotals {
            bills: 50,
            gross: Money::from_cents(200_000),
            tax: Money::from_cents(30_000),
            discount: Money::from_cents(5_000),
        };
        let returns = ReturnTotals {
            returns: 4,
            amount: Money::from_cents(16_000),
            tax: Money::from_cents(2_400),
        };

        let agg = DailySalesAggregate::from_totals(7, date(2025, 1, 15), sales, returns);

        assert_eq!(agg.net_bills, agg.total_bills - agg.total_returns);
        assert_eq!(agg.net_amount, agg.gross_amount - agg.return_amount);
        assert_eq!(agg.net_tax, agg.tax_amount - agg.return_tax);
        assert!(agg.last_sync_at.is_none());
    }

    #[test]
    fn test_empty_day_is_all_zero() {
        let agg = DailySalesAggregate::empty(3, date(2025, 2, 1));

        assert_eq!(agg.total_bills, 0);
        assert_eq!(agg.total_returns, 0);
        assert_eq!(agg.net_bills, 0);
        assert!(agg.gross_amount.is_zero());
        assert!(agg.net_amount.is_zero());
        assert!(agg.net_tax.is_zero());
        assert!(agg.validate().is_ok());
    }

    #[test]
    fn test_returns_heavy_day_goes_negative() {
        // A day where returns from earlier sales outweigh fresh sales is
        // legitimate ERP data and must round-trip unchanged.
        let sales = SaleTotals {
            bills: 2,
            gross: Money::from_cents(5_000),
            tax: Money::from_cents(750),
            discount: Money::zero(),
        };
        let returns = ReturnTotals {
            returns: 6,
            amount: Money::from_cents(22_000),
            tax: Money::from_cents(3_300),
        };

        let agg = DailySalesAggregate::from_totals(1, date(2025, 3, 3), sales, returns);
        assert_eq!(agg.net_bills, -4);
        assert!(agg.net_amount.is_negative());
        assert!(agg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_counts() {
        let mut agg = DailySalesAggregate::empty(1, date(2025, 4, 4));
        agg.total_bills = -1;
        assert!(agg.validate().is_err());
    }

    #[test]
    fn test_queue_record_round_trip_carries_nets() {
        let sales = SaleTotals {
            bills: 10,
            gross: Money::from_cents(40_000),
            tax: Money::from_cents(6_000),
            discount: Money::from_cents(1_000),
        };
        let returns = ReturnTotals {
            returns: 1,
            amount: Money::from_cents(4_000),
            tax: Money::from_cents(600),
        };
        let agg = DailySalesAggregate::from_totals(9, date(2025, 5, 20), sales, returns);

        let record = QueueRecord {
            id: 1,
            branch_id: agg.branch_id,
            sale_date: agg.sale_date,
            total_bills: agg.total_bills,
            total_returns: agg.total_returns,
            net_bills: agg.net_bills,
            gross_amount: agg.gross_amount,
            tax_amount: agg.tax_amount,
            discount_amount: agg.discount_amount,
            return_amount: agg.return_amount,
            return_tax: agg.return_tax,
            net_amount: agg.net_amount,
            net_tax: agg.net_tax,
            created_at: Utc::now(),
            synced: false,
            retry_count: 0,
            last_error: None,
        };

        let replayed = record.to_aggregate();
        assert_eq!(replayed.net_bills, agg.net_bills);
        assert_eq!(replayed.net_amount, agg.net_amount);
        assert_eq!(replayed.net_tax, agg.net_tax);
        assert_eq!(replayed.sale_date, agg.sale_date);
    }
}
