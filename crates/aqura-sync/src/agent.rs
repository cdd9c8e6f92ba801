//! # Sync Agent
//!
//! Main orchestrator for the ERP → cloud pipeline. Drives the periodic
//! today/yesterday cycle, the offline queue drain, and the one-shot
//! historical backfill.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncAgent                                │  │
//! │  │                                                                  │  │
//! │  │  • Owns source, cloud store, queue, probe, event sink            │  │
//! │  │  • One state machine: Idle / Syncing / BackfillRunning           │  │
//! │  │  • Emits structured events to the outbound stream                │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  SalesSource   │  │  CloudStore    │  │   QueueRepository      │    │
//! │  │  (ERP queries) │  │  (upserts)     │  │   (offline fallback)   │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ONE CYCLE:                                                            │
//! │  ──────────                                                            │
//! │  probe → (restored? drain queue, prune) → sync today → sync yesterday  │
//! │                                                                         │
//! │  Every await runs in sequence: today and yesterday share one bounded   │
//! │  ERP pool and must not be issued in a way that starves it.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use aqura_core::DailySalesAggregate;
use aqura_db::Database;

use crate::config::AgentConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEvent, SyncEventSink};
use crate::extractor::SalesSource;
use crate::probe::{Connectivity, ConnectivityProbe};
use crate::publisher::CloudStore;

// =============================================================================
// Agent State
// =============================================================================

/// Scheduler state. `Syncing` and `BackfillRunning` are mutually exclusive;
/// the guard that enforces re-entrancy also enforces that exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Waiting for the next tick.
    Idle,
    /// A periodic cycle is in flight.
    Syncing,
    /// A historical backfill is in flight.
    BackfillRunning,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Idle => write!(f, "idle"),
            AgentState::Syncing => write!(f, "syncing"),
            AgentState::BackfillRunning => write!(f, "backfill"),
        }
    }
}

// =============================================================================
// Agent Status
// =============================================================================

/// Current agent status for external queries.
#[derive(Debug, Clone, Default)]
pub struct AgentStatus {
    /// Whether the last probe saw the cloud store.
    pub online: bool,

    /// Records awaiting publication in the offline queue.
    pub pending_count: i64,

    /// Last successful cycle completion.
    pub last_sync: Option<chrono::DateTime<Utc>>,

    /// Last cycle error (if any).
    pub last_error: Option<String>,
}

// =============================================================================
// Outcomes
// =============================================================================

/// How one date resolved within a cycle.
enum DateOutcome {
    /// Upserted into the cloud store.
    Published(DailySalesAggregate),
    /// Written to the offline queue.
    Queued,
    /// ERP unavailable; the date is retried next cycle.
    Skipped,
}

impl DateOutcome {
    fn describe(&self) -> String {
        match self {
            DateOutcome::Published(aggregate) => format!(
                "{} bills ({})",
                aggregate.net_bills, aggregate.net_amount
            ),
            DateOutcome::Queued => "queued".to_string(),
            DateOutcome::Skipped => "skipped".to_string(),
        }
    }

    fn is_published(&self) -> bool {
        matches!(self, DateOutcome::Published(_))
    }
}

/// Result of one historical backfill run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillSummary {
    /// Dates published or queued.
    pub days_processed: u64,
    /// Dates skipped on extraction failure.
    pub days_failed: u64,
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Main sync agent. Owns every collaborator as a field — there is no
/// module-level mutable state anywhere in the pipeline.
pub struct SyncAgent {
    /// Agent configuration.
    config: Arc<AgentConfig>,

    /// ERP source seam.
    source: Arc<dyn SalesSource>,

    /// Cloud store seam.
    cloud: Arc<dyn CloudStore>,

    /// Durable offline queue.
    db: Database,

    /// Connectivity probe (edge-triggered drain).
    probe: ConnectivityProbe,

    /// Outbound event stream.
    sink: Arc<dyn SyncEventSink>,

    /// Scheduler state guard.
    state: Mutex<AgentState>,

    /// Status snapshot for external queries.
    status: Arc<RwLock<AgentStatus>>,

    /// Shutdown receiver, consumed by `run`.
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

/// Handle for controlling a running agent from outside.
#[derive(Clone)]
pub struct SyncAgentHandle {
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<AgentStatus>>,
}

impl SyncAgentHandle {
    /// Gets the current agent status.
    pub async fn status(&self) -> AgentStatus {
        self.status.read().await.clone()
    }

    /// Signals the agent to stop after the in-flight cycle completes.
    ///
    /// In-flight publishes are atomic upserts, so a stop never leaves a
    /// half-published aggregate behind.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl SyncAgent {
    /// Creates a new sync agent and its control handle.
    pub fn new(
        config: AgentConfig,
        source: Arc<dyn SalesSource>,
        cloud: Arc<dyn CloudStore>,
        db: Database,
        sink: Arc<dyn SyncEventSink>,
    ) -> (Self, SyncAgentHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let status = Arc::new(RwLock::new(AgentStatus::default()));

        let agent = SyncAgent {
            config: Arc::new(config),
            source,
            probe: ConnectivityProbe::new(cloud.clone()),
            cloud,
            db,
            sink,
            state: Mutex::new(AgentState::Idle),
            status: status.clone(),
            shutdown_rx: Some(shutdown_rx),
        };

        let handle = SyncAgentHandle {
            shutdown_tx,
            status,
        };

        (agent, handle)
    }

    /// Returns the current scheduler state.
    pub fn state(&self) -> AgentState {
        *self.state.lock().expect("agent state lock poisoned")
    }

    /// Returns the current status snapshot.
    pub async fn status(&self) -> AgentStatus {
        self.status.read().await.clone()
    }

    // =========================================================================
    // State Guard
    // =========================================================================

    /// Claims the scheduler for `next` if it is idle.
    ///
    /// This is the re-entrancy guard: a tick that lands while the previous
    /// pass is still running is skipped instead of piling up SQL/HTTP calls
    /// faster than they complete. It also keeps `Syncing` and
    /// `BackfillRunning` mutually exclusive.
    fn try_begin(&self, next: AgentState) -> bool {
        let mut state = self.state.lock().expect("agent state lock poisoned");
        if *state == AgentState::Idle {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Returns the scheduler to idle.
    fn finish(&self) {
        let mut state = self.state.lock().expect("agent state lock poisoned");
        *state = AgentState::Idle;
    }

    // =========================================================================
    // Run Loop
    // =========================================================================

    /// Runs the periodic sync loop until shutdown.
    ///
    /// The first tick fires immediately (an operator starting the agent
    /// wants figures now, not in ten seconds), then every
    /// `sync.interval_secs`.
    pub async fn run(&mut self) {
        let mut shutdown_rx = match self.shutdown_rx.take() {
            Some(rx) => rx,
            None => {
                error!("Agent run loop started twice");
                return;
            }
        };

        info!(
            branch_id = self.config.branch_id(),
            interval_secs = self.config.sync.interval_secs,
            "Sync agent starting"
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.sync.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Sync cycle failed");
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync agent received shutdown");
                    break;
                }
            }
        }

        info!("Sync agent stopped");
    }

    // =========================================================================
    // Periodic Cycle
    // =========================================================================

    /// Runs one guarded sync cycle.
    ///
    /// Skips silently when the previous pass (cycle or backfill) is still
    /// in flight.
    pub async fn tick(&self) -> SyncResult<()> {
        if !self.try_begin(AgentState::Syncing) {
            debug!("Previous sync pass still running, skipping tick");
            return Ok(());
        }

        let result = self.cycle().await;
        self.finish();

        if let Err(ref e) = result {
            self.sink
                .emit(SyncEvent::error(format!("Sync cycle failed: {}", e)));
            let mut status = self.status.write().await;
            status.last_error = Some(e.to_string());
        }

        result
    }

    /// One full pass: probe, drain on restored edge, then today and
    /// yesterday in that order.
    async fn cycle(&self) -> SyncResult<()> {
        let started = std::time::Instant::now();
        let report = self.probe.observe().await;

        let mut replayed = 0;
        if report.restored {
            self.sink.emit(SyncEvent::success(
                "Connectivity restored, replaying queued records",
            ));
            replayed = self.drain_queue().await?;
        }

        let today = Utc::now().date_naive();
        let yesterday = today - ChronoDuration::days(1);

        // Today first, then yesterday. Yesterday is re-synced every cycle to
        // absorb late-posted ERP corrections. Each date resolves on its own:
        // a failure on one never blocks the other.
        let today_outcome = self.sync_date(today, report.state).await?;
        let yesterday_outcome = self.sync_date(yesterday, report.state).await?;

        let queue_depth = self.db.queue().count_pending().await?;
        let published = [&today_outcome, &yesterday_outcome]
            .iter()
            .filter(|o| o.is_published())
            .count() as i64;
        let records_synced = published + replayed as i64;

        let queue_suffix = if queue_depth > 0 {
            format!(" [{} queued]", queue_depth)
        } else {
            String::new()
        };

        self.sink.emit(
            SyncEvent::success(format!(
                "{} - synced in {} ms - today: {}, yesterday: {}{}",
                report.state,
                started.elapsed().as_millis(),
                today_outcome.describe(),
                yesterday_outcome.describe(),
                queue_suffix
            ))
            .with_stats(report.state.is_online(), records_synced, queue_depth),
        );

        let mut status = self.status.write().await;
        status.online = report.state.is_online();
        status.pending_count = queue_depth;
        status.last_sync = Some(Utc::now());
        status.last_error = None;

        Ok(())
    }

    /// Extracts one date and resolves it: published, queued, or skipped.
    ///
    /// Only queue I/O failures propagate — they are the one tier with no
    /// further fallback.
    async fn sync_date(&self, date: NaiveDate, state: Connectivity) -> SyncResult<DateOutcome> {
        let aggregate = match self.source.extract(date).await {
            Ok(aggregate) => aggregate,
            Err(SyncError::SourceUnavailable(reason)) => {
                // No trustworthy figures for this date; never substitute a
                // fabricated zero aggregate
                warn!(%date, %reason, "ERP unavailable, skipping date this cycle");
                self.sink.emit(SyncEvent::error(format!(
                    "ERP unavailable for {}: {}",
                    date, reason
                )));
                return Ok(DateOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        // Already known offline: save the network call and queue directly
        if !state.is_online() {
            self.db.queue().enqueue(&aggregate).await?;
            self.sink.emit(SyncEvent::info(format!(
                "Offline - {} saved to local queue",
                date
            )));
            return Ok(DateOutcome::Queued);
        }

        match self.cloud.upsert(&aggregate).await {
            Ok(()) => Ok(DateOutcome::Published(aggregate)),
            Err(e) if e.should_queue() => {
                self.db.queue().enqueue(&aggregate).await?;

                let message = format!("Publish failed for {}, queued for retry: {}", date, e);
                if matches!(e, SyncError::RejectedByStore(_)) {
                    warn!(%date, error = %e, "Cloud store rejected aggregate");
                    self.sink.emit(SyncEvent::error(message));
                } else {
                    self.sink.emit(SyncEvent::info(message));
                }

                Ok(DateOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Queue Drain
    // =========================================================================

    /// Replays the offline queue, oldest first, then prunes.
    ///
    /// Triggered only by the Offline→Online edge. Returns the number of
    /// records replayed successfully.
    async fn drain_queue(&self) -> SyncResult<usize> {
        let queue = self.db.queue();
        let pending = queue.pending().await?;

        if pending.is_empty() {
            queue.prune(self.config.sync.retention_days).await?;
            return Ok(0);
        }

        self.sink.emit(SyncEvent::info(format!(
            "Replaying {} queued records",
            pending.len()
        )));

        let cap = self.config.sync.max_retry_attempts;
        let total = pending.len();
        let mut replayed = 0;

        for record in pending {
            // Records at the retry cap stay in the queue (never pruned while
            // unsynced) but stop consuming replay attempts; they keep
            // warning until an operator intervenes
            if record.retry_count >= cap {
                warn!(
                    id = record.id,
                    sale_date = %record.sale_date,
                    retry_count = record.retry_count,
                    last_error = record.last_error.as_deref().unwrap_or(""),
                    "Skipping queued record past the retry cap"
                );
                self.sink.emit(SyncEvent::error(format!(
                    "Record for {} exceeded {} replay attempts; operator attention needed",
                    record.sale_date, cap
                )));
                continue;
            }

            match self.cloud.upsert(&record.to_aggregate()).await {
                Ok(()) => {
                    queue.mark_synced(record.id).await?;
                    replayed += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    queue.mark_failed(record.id, &e.to_string()).await?;

                    if matches!(e, SyncError::NetworkUnavailable(_)) {
                        // Connectivity dropped mid-drain; the rest stays
                        // queued for the next restored edge rather than
                        // burning a retry on every record
                        warn!(error = %e, "Lost connectivity during replay, stopping drain");
                        break;
                    }

                    warn!(id = record.id, error = %e, "Replay failed for queued record");
                }
            }
        }

        self.sink.emit(SyncEvent::success(format!(
            "Replayed {}/{} queued records",
            replayed, total
        )));

        let pruned = queue.prune(self.config.sync.retention_days).await?;
        if pruned > 0 {
            debug!(pruned, "Pruned synced queue records past retention");
        }

        Ok(replayed)
    }

    // =========================================================================
    // Historical Backfill
    // =========================================================================

    /// Walks the ERP's full date range, publishing (or queuing) every day.
    ///
    /// Explicit, user-invoked, one-shot. Per-date failures are logged and
    /// the walk continues — a single bad day must not block historical
    /// recovery for every other day.
    pub async fn backfill(&self) -> SyncResult<BackfillSummary> {
        if !self.try_begin(AgentState::BackfillRunning) {
            return Err(SyncError::AlreadyRunning);
        }

        let result = self.run_backfill().await;
        self.finish();

        if let Err(ref e) = result {
            self.sink
                .emit(SyncEvent::error(format!("Historical sync failed: {}", e)));
        }

        result
    }

    async fn run_backfill(&self) -> SyncResult<BackfillSummary> {
        self.sink
            .emit(SyncEvent::info("Starting historical data sync"));

        let range = self.source.date_range().await?;
        let Some((first, last)) = range else {
            self.sink
                .emit(SyncEvent::error("No sales data found in ERP source"));
            return Ok(BackfillSummary::default());
        };

        self.sink.emit(SyncEvent::info(format!(
            "Found data from {} to {}",
            first, last
        )));

        let mut summary = BackfillSummary::default();
        let mut day = first;

        loop {
            // Raw ping, not probe.observe(): the probe's remembered state
            // belongs to the periodic loop, and a restored edge must not be
            // swallowed here
            let state = if self.cloud.ping().await {
                Connectivity::Online
            } else {
                Connectivity::Offline
            };

            match self.sync_date(day, state).await {
                Ok(DateOutcome::Skipped) => {
                    summary.days_failed += 1;
                }
                Ok(_) => {
                    summary.days_processed += 1;
                    if summary.days_processed % 10 == 0 {
                        self.sink.emit(SyncEvent::info(format!(
                            "Processed {} days...",
                            summary.days_processed
                        )));
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    summary.days_failed += 1;
                    warn!(%day, error = %e, "Backfill failed for date, continuing");
                }
            }

            if day >= last {
                break;
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        self.sink.emit(SyncEvent::success(format!(
            "Historical sync complete! Synced {} days ({} failed)",
            summary.days_processed, summary.days_failed
        )));

        Ok(summary)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncResult;
    use crate::events::NoOpSink;
    use aqura_core::{Money, ReturnTotals, SaleTotals};
    use aqura_db::DbConfig;
    use async_trait::async_trait;
    use chrono::Datelike;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const BRANCH: i64 = 4;

    fn sample_aggregate(date: NaiveDate) -> DailySalesAggregate {
        let day = date.day() as i64;
        DailySalesAggregate::from_totals(
            BRANCH,
            date,
            SaleTotals {
                bills: 10 + day,
                gross: Money::from_cents(100_000 + day * 100),
                tax: Money::from_cents(15_000),
                discount: Money::from_cents(1_000),
            },
            ReturnTotals {
                returns: 1,
                amount: Money::from_cents(2_000),
                tax: Money::from_cents(300),
            },
        )
    }

    struct MockSource {
        unavailable: StdMutex<HashSet<NaiveDate>>,
        range: Option<(NaiveDate, NaiveDate)>,
    }

    impl MockSource {
        fn new() -> Self {
            MockSource {
                unavailable: StdMutex::new(HashSet::new()),
                range: None,
            }
        }

        fn with_range(first: NaiveDate, last: NaiveDate) -> Self {
            MockSource {
                unavailable: StdMutex::new(HashSet::new()),
                range: Some((first, last)),
            }
        }

        fn set_unavailable(&self, date: NaiveDate) {
            self.unavailable.lock().unwrap().insert(date);
        }
    }

    #[async_trait]
    impl SalesSource for MockSource {
        async fn extract(&self, date: NaiveDate) -> SyncResult<DailySalesAggregate> {
            if self.unavailable.lock().unwrap().contains(&date) {
                return Err(SyncError::SourceUnavailable("connection refused".into()));
            }
            Ok(sample_aggregate(date))
        }

        async fn date_range(&self) -> SyncResult<Option<(NaiveDate, NaiveDate)>> {
            Ok(self.range)
        }
    }

    struct MockCloud {
        online: AtomicBool,
        rejected: StdMutex<HashSet<NaiveDate>>,
        rows: StdMutex<HashMap<(i64, NaiveDate), DailySalesAggregate>>,
        upsert_calls: AtomicUsize,
    }

    impl MockCloud {
        fn new(online: bool) -> Self {
            MockCloud {
                online: AtomicBool::new(online),
                rejected: StdMutex::new(HashSet::new()),
                rows: StdMutex::new(HashMap::new()),
                upsert_calls: AtomicUsize::new(0),
            }
        }

        fn set_online(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }

        fn reject(&self, date: NaiveDate) {
            self.rejected.lock().unwrap().insert(date);
        }

        fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        fn has_row(&self, date: NaiveDate) -> bool {
            self.rows.lock().unwrap().contains_key(&(BRANCH, date))
        }
    }

    #[async_trait]
    impl CloudStore for MockCloud {
        async fn upsert(&self, aggregate: &DailySalesAggregate) -> SyncResult<()> {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);

            if !self.online.load(Ordering::SeqCst) {
                return Err(SyncError::NetworkUnavailable("connection reset".into()));
            }
            if self.rejected.lock().unwrap().contains(&aggregate.sale_date) {
                return Err(SyncError::RejectedByStore("check constraint".into()));
            }

            let mut stored = aggregate.clone();
            stored.last_sync_at = Some(Utc::now());
            self.rows
                .lock()
                .unwrap()
                .insert((aggregate.branch_id, aggregate.sale_date), stored);
            Ok(())
        }

        async fn ping(&self) -> bool {
            self.online.load(Ordering::SeqCst)
        }
    }

    async fn test_agent(
        source: Arc<MockSource>,
        cloud: Arc<MockCloud>,
    ) -> (SyncAgent, SyncAgentHandle) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = AgentConfig::default();
        config.branch.id = BRANCH;
        config.sync.interval_secs = 1;

        SyncAgent::new(config, source, cloud, db, Arc::new(NoOpSink))
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn yesterday() -> NaiveDate {
        today() - ChronoDuration::days(1)
    }

    #[tokio::test]
    async fn test_cycle_publishes_today_and_yesterday() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(true));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        agent.tick().await.unwrap();

        assert!(cloud.has_row(today()));
        assert!(cloud.has_row(yesterday()));
        assert_eq!(cloud.row_count(), 2);
        assert_eq!(agent.db.queue().count_pending().await.unwrap(), 0);

        let status = agent.status().await;
        assert!(status.online);
        assert!(status.last_sync.is_some());
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_publish_is_idempotent_across_cycles() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(true));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        agent.tick().await.unwrap();
        agent.tick().await.unwrap();

        // Four upserts, still exactly one row per natural key
        assert_eq!(cloud.upsert_calls.load(Ordering::SeqCst), 4);
        assert_eq!(cloud.row_count(), 2);
    }

    #[tokio::test]
    async fn test_offline_cycle_queues_both_dates() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(false));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        agent.tick().await.unwrap();

        assert_eq!(cloud.row_count(), 0);
        // Probe saw Offline, so no doomed upsert was attempted
        assert_eq!(cloud.upsert_calls.load(Ordering::SeqCst), 0);
        assert_eq!(agent.db.queue().count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_no_data_loss_under_partition() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(true));
        let (agent, _handle) = test_agent(source.clone(), cloud.clone()).await;

        // Start online so the probe records the Online state
        agent.tick().await.unwrap();

        // Partition: two offline cycles accumulate queued aggregates
        cloud.set_online(false);
        agent.tick().await.unwrap();
        agent.tick().await.unwrap();
        assert_eq!(agent.db.queue().count_pending().await.unwrap(), 4);

        // Heal: restored edge drains everything
        cloud.set_online(true);
        agent.tick().await.unwrap();

        assert_eq!(agent.db.queue().count_pending().await.unwrap(), 0);
        // Exactly one row per (branch_id, sale_date), despite replays
        assert_eq!(cloud.row_count(), 2);
        assert!(cloud.has_row(today()));
        assert!(cloud.has_row(yesterday()));
    }

    #[tokio::test]
    async fn test_publish_failure_then_recovery() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(true));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        agent.tick().await.unwrap();

        cloud.set_online(false);
        agent.tick().await.unwrap();

        let pending = agent.db.queue().pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|r| r.retry_count == 0 && !r.synced));

        cloud.set_online(true);
        agent.tick().await.unwrap();

        assert!(agent.db.queue().pending().await.unwrap().is_empty());

        let synced: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE synced = 1")
                .fetch_one(agent.db.pool())
                .await
                .unwrap();
        assert_eq!(synced, 2);
    }

    #[tokio::test]
    async fn test_source_unavailable_skips_without_fabrication() {
        let source = Arc::new(MockSource::new());
        source.set_unavailable(today());
        let cloud = Arc::new(MockCloud::new(true));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        agent.tick().await.unwrap();

        // Yesterday still syncs; today is neither published nor queued
        assert!(!cloud.has_row(today()));
        assert!(cloud.has_row(yesterday()));
        assert_eq!(agent.db.queue().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejected_by_store_is_queued() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(true));
        cloud.reject(today());
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        agent.tick().await.unwrap();

        // Yesterday published; today's rejection did not block it
        assert!(cloud.has_row(yesterday()));
        assert!(!cloud.has_row(today()));

        let pending = agent.db.queue().pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sale_date, today());
    }

    #[tokio::test]
    async fn test_drain_skips_records_at_retry_cap() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(true));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        // A poisoned record that already burned through its attempts
        let poisoned_date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let record = agent
            .db
            .queue()
            .enqueue(&sample_aggregate(poisoned_date))
            .await
            .unwrap();
        for _ in 0..10 {
            agent
                .db
                .queue()
                .mark_failed(record.id, "check constraint")
                .await
                .unwrap();
        }

        // Restored edge: drain runs, skips the capped record
        agent.tick().await.unwrap();

        assert!(!cloud.has_row(poisoned_date));
        // Still pending — capped records are never pruned while unsynced
        assert_eq!(agent.db.queue().count_pending().await.unwrap(), 1);
        let pending = agent.db.queue().pending().await.unwrap();
        assert_eq!(pending[0].retry_count, 10);
    }

    #[tokio::test]
    async fn test_backfill_continues_past_bad_day() {
        let first = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let bad_day = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();

        let source = Arc::new(MockSource::with_range(first, last));
        source.set_unavailable(bad_day);
        let cloud = Arc::new(MockCloud::new(true));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        let summary = agent.backfill().await.unwrap();

        assert_eq!(summary.days_processed, 9);
        assert_eq!(summary.days_failed, 1);
        assert_eq!(cloud.row_count(), 9);
        assert!(!cloud.has_row(bad_day));
        assert!(cloud.has_row(first));
        assert!(cloud.has_row(last));
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn test_backfill_queues_days_while_offline() {
        let first = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2025, 4, 3).unwrap();

        let source = Arc::new(MockSource::with_range(first, last));
        let cloud = Arc::new(MockCloud::new(false));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        let summary = agent.backfill().await.unwrap();

        // Queued still counts as processed: the data is safe on disk
        assert_eq!(summary.days_processed, 3);
        assert_eq!(cloud.row_count(), 0);
        assert_eq!(agent.db.queue().count_pending().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_backfill_with_empty_erp() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(true));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        let summary = agent.backfill().await.unwrap();
        assert_eq!(summary.days_processed, 0);
        assert_eq!(cloud.row_count(), 0);
    }

    #[tokio::test]
    async fn test_tick_skipped_while_backfill_running() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(true));
        let (agent, _handle) = test_agent(source, cloud.clone()).await;

        assert!(agent.try_begin(AgentState::BackfillRunning));

        // Tick lands mid-backfill: skipped, no I/O
        agent.tick().await.unwrap();
        assert_eq!(cloud.upsert_calls.load(Ordering::SeqCst), 0);

        // And a second backfill is refused outright
        assert!(matches!(
            agent.backfill().await,
            Err(SyncError::AlreadyRunning)
        ));

        agent.finish();
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let source = Arc::new(MockSource::new());
        let cloud = Arc::new(MockCloud::new(true));
        let (mut agent, handle) = test_agent(source, cloud.clone()).await;

        let task = tokio::spawn(async move { agent.run().await });

        // Wait for the immediate first tick to land
        for _ in 0..100 {
            if cloud.row_count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(cloud.row_count(), 2);

        handle.shutdown().await;
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("run loop did not stop")
            .unwrap();
    }
}
