//! # aqura-core: Pure Domain Types
//!
//! Zero-I/O domain types for the Aqura ERP sync agent.
//!
//! ## What Lives Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          aqura-core                                     │
//! │                                                                         │
//! │  money.rs   Money - integer-cents monetary values                       │
//! │  types.rs   DailySalesAggregate - the unit of synchronization           │
//! │             QueueRecord - durable wrapper for offline aggregates        │
//! │             SaleTotals / ReturnTotals - raw extraction sums             │
//! │  error.rs   CoreError - aggregate validation failures                   │
//! │                                                                         │
//! │  No async. No database. No network. Fully testable in isolation.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The One Rule That Matters
//! The net invariants (`net_bills`, `net_amount`, `net_tax`) are computed in
//! exactly one place: [`types::DailySalesAggregate::from_totals`]. The queue
//! and the publisher carry them verbatim. This keeps extracted and
//! replayed-from-queue records bit-identical.

pub mod error;
pub mod money;
pub mod types;

// Re-exports for convenient access
pub use error::{CoreError, CoreResult};
pub use money::Money;
pub use types::{DailySalesAggregate, QueueRecord, ReturnTotals, SaleTotals};
