//! # Connectivity Probe
//!
//! Classifies the current network state and detects the Offline→Online
//! transition that triggers a queue drain.
//!
//! ## Edge Triggering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Probe State Transitions                              │
//! │                                                                         │
//! │   previous │ current  │ restored │ effect                              │
//! │  ──────────┼──────────┼──────────┼───────────────────────────────      │
//! │   Offline  │ Online   │   true   │ drain queue, then publish live      │
//! │   Online   │ Online   │  false   │ publish live                        │
//! │   Online   │ Offline  │  false   │ queue fresh aggregates              │
//! │   Offline  │ Offline  │  false   │ queue fresh aggregates              │
//! │                                                                         │
//! │  The probe starts pessimistic (Offline), so records left over from a   │
//! │  previous run drain on the first successful check.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::publisher::CloudStore;

// =============================================================================
// Connectivity State
// =============================================================================

/// Network state as seen from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Cloud store answered the probe read.
    Online,
    /// Cloud store unreachable.
    Offline,
}

impl Connectivity {
    /// Returns true when Online.
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Online => write!(f, "Online"),
            Connectivity::Offline => write!(f, "Offline"),
        }
    }
}

/// Result of one probe observation.
#[derive(Debug, Clone, Copy)]
pub struct ProbeReport {
    /// Current network state.
    pub state: Connectivity,

    /// True exactly on the Offline→Online edge. This is the single trigger
    /// for replaying the offline queue.
    pub restored: bool,
}

// =============================================================================
// Connectivity Probe
// =============================================================================

/// Stateful probe over the cloud store's `ping`.
pub struct ConnectivityProbe {
    store: Arc<dyn CloudStore>,
    last: Mutex<Connectivity>,
}

impl ConnectivityProbe {
    /// Creates a probe.
    ///
    /// Starts as Offline so leftover queue records from a previous run are
    /// replayed on the first online observation.
    pub fn new(store: Arc<dyn CloudStore>) -> Self {
        ConnectivityProbe {
            store,
            last: Mutex::new(Connectivity::Offline),
        }
    }

    /// Checks connectivity and reports the transition.
    ///
    /// Called once per cycle; the lock is only held to swap the remembered
    /// state, never across an await.
    pub async fn observe(&self) -> ProbeReport {
        let state = if self.store.ping().await {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };

        let previous = {
            let mut last = self.last.lock().expect("probe state lock poisoned");
            std::mem::replace(&mut *last, state)
        };

        let restored = previous == Connectivity::Offline && state == Connectivity::Online;

        match (previous, state) {
            (Connectivity::Offline, Connectivity::Online) => {
                info!("Connectivity restored");
            }
            (Connectivity::Online, Connectivity::Offline) => {
                warn!("Connectivity lost, falling back to offline queue");
            }
            _ => debug!(%state, "Connectivity unchanged"),
        }

        ProbeReport { state, restored }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncResult;
    use aqura_core::DailySalesAggregate;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeStore {
        online: AtomicBool,
    }

    #[async_trait]
    impl CloudStore for FakeStore {
        async fn upsert(&self, _aggregate: &DailySalesAggregate) -> SyncResult<()> {
            Ok(())
        }

        async fn ping(&self) -> bool {
            self.online.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_restored_fires_only_on_edge() {
        let store = Arc::new(FakeStore {
            online: AtomicBool::new(true),
        });
        let probe = ConnectivityProbe::new(store.clone());

        // First observation: Offline (initial) → Online
        let report = probe.observe().await;
        assert!(report.state.is_online());
        assert!(report.restored);

        // Steady Online: no edge
        let report = probe.observe().await;
        assert!(report.state.is_online());
        assert!(!report.restored);

        // Drop offline: no restored edge
        store.online.store(false, Ordering::SeqCst);
        let report = probe.observe().await;
        assert!(!report.state.is_online());
        assert!(!report.restored);

        // Steady Offline
        let report = probe.observe().await;
        assert!(!report.restored);

        // Back online: edge fires exactly once
        store.online.store(true, Ordering::SeqCst);
        let report = probe.observe().await;
        assert!(report.restored);
        let report = probe.observe().await;
        assert!(!report.restored);
    }
}
