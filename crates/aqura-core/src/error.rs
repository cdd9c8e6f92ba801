//! # Error Types
//!
//! Domain-specific error types for aqura-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  aqura-core errors (this file)                                         │
//! │  └── CoreError        - Aggregate validation failures                  │
//! │                                                                         │
//! │  aqura-db errors (separate crate)                                      │
//! │  └── DbError          - Durable queue operation failures               │
//! │                                                                         │
//! │  aqura-sync errors (separate crate)                                    │
//! │  └── SyncError        - Extraction / publish / cycle failures          │
//! │                                                                         │
//! │  Flow: CoreError → SyncError → event stream → operator                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Domain validation errors.
///
/// These represent data that violates the aggregate's own rules. They should
/// never occur on a healthy pipeline; a hit means a corrupted queue row or a
/// broken ERP extract, and the record must not reach the cloud store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A count field that can only come from SQL `COUNT(*)` is negative.
    #[error("{field} is negative ({value}); refusing to publish")]
    NegativeCount {
        field: &'static str,
        value: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::NegativeCount {
            field: "total_bills",
            value: -3,
        };
        assert!(err.to_string().contains("total_bills"));
        assert!(err.to_string().contains("-3"));
    }
}
