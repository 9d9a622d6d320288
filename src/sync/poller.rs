//! Poller and reconciler
//!
//! The [`Reconciler`] fetches the account snapshot, drops responses that were
//! superseded while in flight, and publishes on the bus only when the
//! snapshot actually changed. The [`PollLoop`] drives it: once on mount, on a
//! fixed timer, and on demand (focus regained, relay nudges, own mutations).
//!
//! Nothing here returns an error to the caller. Failed fetches are logged and
//! counted; the cached snapshot is kept and the next cycle tries again.

use super::bus::{BusEvent, Subscription, SyncBus};
use crate::inbox::{AccountId, AccountSnapshot, FetchFailure, MessageStore, SessionRefresher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Default poll interval (22 seconds)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(22);

/// Capacity of the poll command channel
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Result of one reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The snapshot differed from the cache and was published
    Changed { unread: usize },
    /// Same snapshot as last time; nothing published
    Unchanged,
    /// A newer response was already applied
    Stale,
    /// The fetch failed; cache kept
    Failed(FetchFailure),
    /// The session was torn down
    Detached,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Changed { .. } => "changed",
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::Stale => "stale",
            ReconcileOutcome::Failed(FetchFailure::Transient) => "failed_transient",
            ReconcileOutcome::Failed(FetchFailure::Malformed) => "failed_malformed",
            ReconcileOutcome::Failed(FetchFailure::Other) => "failed_other",
            ReconcileOutcome::Detached => "detached",
        }
    }
}

#[derive(Debug, Default)]
struct Cache {
    snapshot: Option<AccountSnapshot>,
    /// Sequence number of the newest applied response
    applied_seq: u64,
}

/// Fetches, de-duplicates and publishes account snapshots
pub struct Reconciler {
    account: AccountId,
    store: Arc<dyn MessageStore>,
    session: Arc<dyn SessionRefresher>,
    bus: Arc<SyncBus>,
    next_seq: AtomicU64,
    alive: AtomicBool,
    cache: Mutex<Cache>,
}

impl Reconciler {
    pub fn new(
        account: AccountId,
        store: Arc<dyn MessageStore>,
        session: Arc<dyn SessionRefresher>,
        bus: Arc<SyncBus>,
    ) -> Self {
        Self {
            account,
            store,
            session,
            bus,
            next_seq: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            cache: Mutex::new(Cache::default()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<SyncBus> {
        &self.bus
    }

    /// Last snapshot published by this reconciler
    pub fn snapshot(&self) -> Option<AccountSnapshot> {
        self.cache().snapshot.clone()
    }

    /// Subscribe to the bus, seeded with the current snapshot if any
    ///
    /// Seeding and subscribing happen under the lock held while publishing,
    /// so the seed is never delivered after a newer snapshot.
    pub fn subscribe_seeded(&self) -> (Subscription, mpsc::UnboundedReceiver<BusEvent>) {
        let cache = self.cache();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(snapshot) = &cache.snapshot {
            let _ = tx.send(BusEvent::full(snapshot.clone()));
        }
        let subscription = self.bus.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        drop(cache);
        (subscription, rx)
    }

    pub fn is_attached(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop applying results; in-flight fetches are discarded when they land
    pub fn detach(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            tracing::debug!(account = %self.account, "Reconciler detached");
        }
    }

    /// Fetch the snapshot and publish it if it changed
    pub async fn reconcile(&self, force_refresh: bool) -> ReconcileOutcome {
        let outcome = self.reconcile_inner(force_refresh).await;
        crate::metrics::record_reconcile(outcome.as_str());
        outcome
    }

    async fn reconcile_inner(&self, force_refresh: bool) -> ReconcileOutcome {
        if !self.is_attached() {
            return ReconcileOutcome::Detached;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);

        if force_refresh {
            if let Err(e) = self.session.refresh().await {
                tracing::warn!(account = %self.account, error = %e, "Session refresh failed; fetching anyway");
            }
        }

        let fetched = self.store.get_snapshot(&self.account).await;

        if !self.is_attached() {
            tracing::debug!(account = %self.account, seq, "Discarding response after teardown");
            return ReconcileOutcome::Detached;
        }

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let kind = e.kind();
                tracing::warn!(
                    account = %self.account,
                    seq,
                    failure = kind.as_str(),
                    error = %e,
                    "Snapshot fetch failed; keeping cached state"
                );
                return ReconcileOutcome::Failed(kind);
            }
        };

        // Held through publish so subscribers see snapshots in sequence order
        let mut cache = self.cache();
        if seq < cache.applied_seq {
            tracing::debug!(
                account = %self.account,
                seq,
                applied = cache.applied_seq,
                "Discarding superseded response"
            );
            return ReconcileOutcome::Stale;
        }
        cache.applied_seq = seq;

        if cache.snapshot.as_ref() == Some(&snapshot) {
            return ReconcileOutcome::Unchanged;
        }

        let unread = snapshot.unread_count();
        tracing::debug!(
            account = %self.account,
            seq,
            unread,
            total = snapshot.len(),
            "Snapshot changed"
        );
        crate::metrics::set_unread(unread);
        cache.snapshot = Some(snapshot.clone());
        self.bus.publish(BusEvent::full(snapshot));
        drop(cache);

        ReconcileOutcome::Changed { unread }
    }
}

/// Commands accepted by a running poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollCommand {
    /// The client came back into focus: refresh the session and reconcile
    FocusRegained,
    /// Reconcile now
    ReconcileNow { force_refresh: bool },
    /// Change the timer period
    SetInterval(Duration),
    Shutdown,
}

/// Timer-driven reconcile task
pub struct PollLoop {
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl PollLoop {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start the loop. The first tick is immediate, which is the mount reconcile.
    pub fn spawn(self) -> PollHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let reconciler = Arc::clone(&self.reconciler);
        let task = tokio::spawn(self.run(rx));
        PollHandle {
            tx,
            reconciler,
            task: Some(task),
        }
    }

    async fn run(self, mut commands: mpsc::Receiver<PollCommand>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            account = %self.reconciler.account(),
            interval_secs = self.interval.as_secs_f64(),
            "Poll loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.reconciler.reconcile(false).await;
                }
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        PollCommand::FocusRegained => {
                            self.reconciler.reconcile(true).await;
                        }
                        PollCommand::ReconcileNow { force_refresh } => {
                            self.reconciler.reconcile(force_refresh).await;
                        }
                        PollCommand::SetInterval(period) => {
                            interval = tokio::time::interval_at(Instant::now() + period, period);
                            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            tracing::debug!(interval_secs = period.as_secs_f64(), "Poll interval changed");
                        }
                        PollCommand::Shutdown => break,
                    }
                }
            }
            if !self.reconciler.is_attached() {
                break;
            }
        }

        tracing::info!(account = %self.reconciler.account(), "Poll loop stopped");
    }
}

/// Handle on a running [`PollLoop`]
///
/// Dropping the handle tears the loop down.
pub struct PollHandle {
    tx: mpsc::Sender<PollCommand>,
    reconciler: Arc<Reconciler>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Sender for callers that outlive a borrow of the handle
    pub fn sender(&self) -> mpsc::Sender<PollCommand> {
        self.tx.clone()
    }

    /// Queue a command without waiting; a full queue already holds a reconcile
    pub fn nudge(&self, cmd: PollCommand) {
        if let Err(e) = self.tx.try_send(cmd) {
            tracing::debug!(error = %e, "Poll command not queued");
        }
    }

    pub fn focus_regained(&self) {
        self.nudge(PollCommand::FocusRegained);
    }

    pub fn reconcile_now(&self, force_refresh: bool) {
        self.nudge(PollCommand::ReconcileNow { force_refresh });
    }

    pub fn set_interval(&self, period: Duration) {
        self.nudge(PollCommand::SetInterval(period));
    }

    /// Cancel the timer and discard anything still in flight
    pub async fn shutdown(mut self) {
        self.reconciler.detach();
        let _ = self.tx.try_send(PollCommand::Shutdown);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.reconciler.detach();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
