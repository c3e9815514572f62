//! # Sync Engine
//!
//! Decides whether to fetch, fetches the catalog and the active setlist, and
//! writes them through to the Local Store.
//!
//! ## Single flight
//!
//! At most one run executes per engine. A run is a spawned task whose report
//! is shared: a caller arriving while a run is in flight awaits that run
//! instead of starting another. The run finishes even if every caller goes
//! away.
//!
//! ## Write after validate
//!
//! Fetched data is checked before anything is written. Songs are committed
//! before the setlist that references them. A failed stage never deletes
//! what an earlier run cached.
//!
//! ```rust,ignore
//! let engine = SyncEngine::new(SyncConfig::default(), store, remote, network, clock);
//! engine.restore().await;
//! if engine.needs_sync() {
//!     let report = engine.sync_data().await;
//! }
//! ```

use crate::error::{Result, SyncError, SyncFailure, SyncFailureKind, SyncStage};
use crate::state::{SyncOutcome, SyncReport, SyncState, SyncTrigger};
use bridge_traits::Clock;
use core_async::sync::{watch, Mutex};
use core_async::task::{spawn, JoinHandle};
use core_async::time::{timeout, Duration};
use core_async::{BoxFuture, FutureExt, Shared};
use core_library::{LocalStore, RemoteDataSource, RemoteResult, Setlist, Song};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::NetworkStatusMonitor;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Age of the last successful sync beyond which a refresh is due
    pub staleness_threshold: Duration,

    /// Bound on each remote call
    pub fetch_timeout: Duration,

    /// Title of the setlist every run refreshes
    pub active_setlist_title: String,

    /// Also refresh the gig list
    pub include_gigs: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::from_secs(6 * 60 * 60),
            fetch_timeout: Duration::from_secs(8),
            active_setlist_title: "Rehearsal".to_string(),
            include_gigs: false,
        }
    }
}

impl SyncConfig {
    pub fn with_staleness_threshold(mut self, threshold: Duration) -> Self {
        self.staleness_threshold = threshold;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn with_active_setlist_title(mut self, title: impl Into<String>) -> Self {
        self.active_setlist_title = title.into();
        self
    }

    pub fn with_gigs(mut self, include_gigs: bool) -> Self {
        self.include_gigs = include_gigs;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.staleness_threshold.is_zero() {
            return Err("staleness_threshold must be greater than zero".to_string());
        }
        if self.fetch_timeout.is_zero() {
            return Err("fetch_timeout must be greater than zero".to_string());
        }
        if self.active_setlist_title.trim().is_empty() {
            return Err("active_setlist_title cannot be empty".to_string());
        }
        Ok(())
    }
}

type SharedReport = Shared<BoxFuture<'static, SyncReport>>;

struct InFlight {
    run_id: String,
    report: SharedReport,
}

struct EngineInner {
    config: SyncConfig,
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteDataSource>,
    network: Arc<NetworkStatusMonitor>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    state: watch::Sender<SyncState>,
    in_flight: Mutex<Option<InFlight>>,
}

/// Cheap to clone; clones share the same latch and state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteDataSource>,
        network: Arc<NetworkStatusMonitor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(config, store, remote, network, clock, None)
    }

    pub fn with_event_bus(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteDataSource>,
        network: Arc<NetworkStatusMonitor>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self::build(config, store, remote, network, clock, Some(event_bus))
    }

    fn build(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteDataSource>,
        network: Arc<NetworkStatusMonitor>,
        clock: Arc<dyn Clock>,
        event_bus: Option<EventBus>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                remote,
                network,
                clock,
                event_bus,
                state,
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Load persisted state so staleness survives a restart. A storage error
    /// leaves the state at "never synced".
    pub async fn restore(&self) -> SyncState {
        match self.inner.store.load_sync_state().await {
            Ok(persisted) => {
                let restored = SyncState::from_persisted(&persisted);
                debug!(
                    last_successful_sync = ?restored.last_successful_sync,
                    "Restored sync state"
                );
                self.inner.state.send_replace(restored.clone());
                restored
            }
            Err(e) => {
                warn!(error = %e, "Could not load persisted sync state");
                self.state()
            }
        }
    }

    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.state.borrow().in_progress
    }

    /// True when nothing was ever synced or the last success is older than
    /// the staleness threshold. No I/O.
    pub fn needs_sync(&self) -> bool {
        let last = self.inner.state.borrow().last_successful_sync;
        match last {
            None => true,
            Some(last) => {
                let age_ms = self.inner.clock.unix_timestamp_millis() - last;
                age_ms > self.inner.config.staleness_threshold.as_millis() as i64
            }
        }
    }

    /// Cold-start population.
    ///
    /// # Errors
    /// `Offline` immediately when the monitor reports no network. Any
    /// failed or partial run is returned as an error.
    pub async fn fetch_and_store_data(&self) -> Result<SyncReport> {
        let report = self.run(SyncTrigger::ColdStart).await;
        match &report.outcome {
            SyncOutcome::Success { .. } => Ok(report),
            SyncOutcome::Partial { reason } => Err(SyncError::Partial(reason.clone())),
            SyncOutcome::Failed { reason } => Err(SyncError::from(reason.clone())),
            SyncOutcome::Unknown => Err(SyncError::Aborted(report.run_id)),
        }
    }

    /// Background or manual refresh. Never fails; the outcome is in the
    /// report and in [`SyncState`].
    pub async fn sync_data(&self) -> SyncReport {
        self.run(SyncTrigger::Manual).await
    }

    /// Detached refresh. The handle may be dropped.
    pub fn spawn_background_sync(&self) -> JoinHandle<SyncReport> {
        let engine = self.clone();
        spawn(async move { engine.run(SyncTrigger::Background).await })
    }

    /// Wait for the in-flight run, if any.
    pub async fn wait_idle(&self) {
        let pending = self
            .inner
            .in_flight
            .lock()
            .await
            .as_ref()
            .map(|f| f.report.clone());
        if let Some(report) = pending {
            report.await;
        }
    }

    /// Back to "unknown / never synced". Waits for an in-flight run first.
    pub async fn reset(&self) {
        self.wait_idle().await;
        self.inner.state.send_replace(SyncState::default());
        info!("Sync state reset");
    }

    /// Wipe the store and reset the state with the latch held, so no run can
    /// start between the wipe and the reset. Waits for an in-flight run first.
    ///
    /// # Errors
    /// The store's error from `clear_all`; the state is left untouched.
    #[instrument(skip(self))]
    pub async fn clear_local_data(&self) -> core_library::Result<()> {
        loop {
            let slot = self.inner.in_flight.lock().await;
            if let Some(running) = slot.as_ref() {
                let pending = running.report.clone();
                drop(slot);
                pending.await;
                continue;
            }
            self.inner.store.clear_all().await?;
            self.inner.state.send_replace(SyncState::default());
            info!("Local data cleared and sync state reset");
            return Ok(());
        }
    }

    /// Join the in-flight run or start a new one.
    async fn run(&self, trigger: SyncTrigger) -> SyncReport {
        let report = {
            let mut slot = self.inner.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => {
                    debug!(run_id = %existing.run_id, %trigger, "Joining in-flight sync");
                    existing.report.clone()
                }
                None => {
                    let run_id = Uuid::new_v4().to_string();
                    let report = self.start(run_id.clone(), trigger);
                    *slot = Some(InFlight {
                        run_id,
                        report: report.clone(),
                    });
                    report
                }
            }
        };
        report.await
    }

    fn start(&self, run_id: String, trigger: SyncTrigger) -> SharedReport {
        let inner = Arc::clone(&self.inner);
        let started_at = inner.clock.unix_timestamp_millis();
        inner.state.send_modify(|state| {
            state.in_progress = true;
            state.last_attempt_at = Some(started_at);
        });

        // The task releases the latch whether or not anyone awaits the report.
        let task = spawn({
            let inner = Arc::clone(&inner);
            let run_id = run_id.clone();
            async move {
                let run = inner.execute(run_id.clone(), trigger, started_at);
                let report = match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(report) => report,
                    Err(_) => {
                        error!(run_id = %run_id, "Sync task panicked");
                        let message = "sync task panicked".to_string();
                        inner.finish_aborted(&run_id, trigger, started_at, message)
                    }
                };
                inner.release(&run_id).await;
                report
            }
        });

        async move {
            match task.await {
                Ok(report) => report,
                Err(e) => {
                    error!(run_id = %run_id, error = %e, "Sync task ended abnormally");
                    inner.release(&run_id).await;
                    inner.finish_aborted(&run_id, trigger, started_at, e.to_string())
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Checks a fetched catalog before any of it is written.
pub fn validate_catalog(songs: &[Song]) -> std::result::Result<(), String> {
    let mut seen = HashSet::with_capacity(songs.len());
    for song in songs {
        song.validate()?;
        if !seen.insert(song.id.as_str()) {
            return Err(format!("duplicate song id {}", song.id));
        }
    }
    Ok(())
}

struct RunCounts {
    songs: u64,
    setlist_items: u64,
    gigs: u64,
}

impl EngineInner {
    #[instrument(skip(self, run_id, trigger, started_at), fields(run_id = %run_id, trigger = %trigger))]
    async fn execute(&self, run_id: String, trigger: SyncTrigger, started_at: i64) -> SyncReport {
        info!("Sync started");
        self.emit(SyncEvent::Started {
            run_id: run_id.clone(),
            trigger: trigger.as_str().to_string(),
        });

        let mut counts = RunCounts {
            songs: 0,
            setlist_items: 0,
            gigs: 0,
        };
        let outcome = self.fetch_and_write(&mut counts).await;
        self.finish(run_id, trigger, started_at, outcome, counts).await
    }

    async fn fetch_and_write(&self, counts: &mut RunCounts) -> SyncOutcome {
        if !self.network.is_online() {
            return SyncOutcome::Failed {
                reason: SyncFailure::new(
                    SyncFailureKind::Offline,
                    SyncStage::Songs,
                    "network status monitor reports offline",
                ),
            };
        }

        // Songs: nothing is committed on failure.
        let songs = match self.fetch(SyncStage::Songs, self.remote.get_all_songs()).await {
            Ok(songs) => songs,
            Err(reason) => return SyncOutcome::Failed { reason },
        };
        if let Err(message) = validate_catalog(&songs) {
            return SyncOutcome::Failed {
                reason: SyncFailure::new(SyncFailureKind::ParseError, SyncStage::Songs, message),
            };
        }
        if let Err(e) = self.store.put_songs(&songs).await {
            return SyncOutcome::Failed {
                reason: SyncFailure::from_storage(SyncStage::Songs, &e),
            };
        }
        counts.songs = songs.len() as u64;
        debug!(songs = counts.songs, "Songs committed");

        // Later stages: songs stay committed on failure.
        let title = self.config.active_setlist_title.as_str();
        match self.fetch(SyncStage::Setlist, self.remote.get_setlist(title)).await {
            Ok(Some(setlist)) => match self.write_setlist(&setlist).await {
                Ok(items) => counts.setlist_items = items,
                Err(reason) => return SyncOutcome::Partial { reason },
            },
            Ok(None) => debug!(title, "Active setlist not found remotely"),
            Err(reason) => return SyncOutcome::Partial { reason },
        }

        if self.config.include_gigs {
            let gigs = match self.fetch(SyncStage::Gigs, self.remote.get_gigs()).await {
                Ok(gigs) => gigs,
                Err(reason) => return SyncOutcome::Partial { reason },
            };
            if let Err(e) = self.store.put_gigs(&gigs).await {
                return SyncOutcome::Partial {
                    reason: SyncFailure::from_storage(SyncStage::Gigs, &e),
                };
            }
            counts.gigs = gigs.len() as u64;
        }

        SyncOutcome::Success {
            songs: counts.songs,
            setlist_items: counts.setlist_items,
            gigs: counts.gigs,
        }
    }

    async fn fetch<T, F>(&self, stage: SyncStage, call: F) -> std::result::Result<T, SyncFailure>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        match timeout(self.config.fetch_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SyncFailure::from_remote(stage, &e)),
            Err(_) => Err(SyncFailure::new(
                SyncFailureKind::Timeout,
                stage,
                format!(
                    "no response within {} ms",
                    self.config.fetch_timeout.as_millis()
                ),
            )),
        }
    }

    async fn write_setlist(&self, setlist: &Setlist) -> std::result::Result<u64, SyncFailure> {
        setlist.validate().map_err(|message| {
            SyncFailure::new(SyncFailureKind::ParseError, SyncStage::Setlist, message)
        })?;
        self.store
            .put_setlist(setlist)
            .await
            .map_err(|e| SyncFailure::from_storage(SyncStage::Setlist, &e))?;
        Ok(setlist.items.len() as u64)
    }

    async fn finish(
        &self,
        run_id: String,
        trigger: SyncTrigger,
        started_at: i64,
        outcome: SyncOutcome,
        counts: RunCounts,
    ) -> SyncReport {
        let finished_at = self.clock.unix_timestamp_millis();

        let mut snapshot = SyncState::default();
        self.state.send_modify(|state| {
            state.in_progress = false;
            state.last_outcome = outcome.clone();
            if outcome.is_success() {
                // Strictly increasing even if the clock stood still.
                let floor = state.last_successful_sync.map_or(i64::MIN, |t| t + 1);
                state.last_successful_sync = Some(finished_at.max(floor));
            }
            snapshot = state.clone();
        });

        if let Err(e) = self.store.save_sync_state(&snapshot.to_persisted()).await {
            warn!(error = %e, "Could not persist sync state");
        }

        let duration_ms = (finished_at - started_at).max(0) as u64;
        match &outcome {
            SyncOutcome::Success {
                songs,
                setlist_items,
                ..
            } => {
                info!(songs, setlist_items, duration_ms, "Sync completed");
                self.emit(SyncEvent::Completed {
                    run_id: run_id.clone(),
                    songs: *songs,
                    setlist_items: *setlist_items,
                    duration_ms,
                });
            }
            SyncOutcome::Partial { reason } => {
                warn!(kind = %reason.kind, stage = ?reason.stage, error = %reason.message, "Sync partially completed");
                self.emit(SyncEvent::Partial {
                    run_id: run_id.clone(),
                    songs: counts.songs,
                    reason: reason.to_string(),
                });
            }
            SyncOutcome::Failed { reason } => {
                warn!(kind = %reason.kind, stage = ?reason.stage, error = %reason.message, "Sync failed");
                self.emit(SyncEvent::Failed {
                    run_id: run_id.clone(),
                    kind: reason.kind.as_str().to_string(),
                    message: reason.message.clone(),
                });
            }
            SyncOutcome::Unknown => {}
        }

        SyncReport {
            run_id,
            trigger,
            outcome,
            songs_written: counts.songs,
            setlist_items_written: counts.setlist_items,
            gigs_written: counts.gigs,
            started_at,
            finished_at,
        }
    }

    fn finish_aborted(
        &self,
        run_id: &str,
        trigger: SyncTrigger,
        started_at: i64,
        message: String,
    ) -> SyncReport {
        self.state.send_modify(|state| state.in_progress = false);
        self.emit(SyncEvent::Failed {
            run_id: run_id.to_string(),
            kind: "aborted".to_string(),
            message,
        });
        SyncReport {
            run_id: run_id.to_string(),
            trigger,
            outcome: SyncOutcome::Unknown,
            songs_written: 0,
            setlist_items_written: 0,
            gigs_written: 0,
            started_at,
            finished_at: self.clock.unix_timestamp_millis(),
        }
    }

    /// Free the latch if it still holds `run_id`.
    async fn release(&self, run_id: &str) {
        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().map(|f| f.run_id.as_str()) == Some(run_id) {
            *slot = None;
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}
