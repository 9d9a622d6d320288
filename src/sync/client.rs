//! Client session wiring
//!
//! One [`ClientSession`] is one open client of an account: its own bus,
//! alert policy, reconciler, poll loop, mutator and relay listener. Several
//! sessions may share a store and a relay channel.

use super::alert::AlertPolicy;
use super::bus::{BusEvent, Subscription, SyncBus};
use super::cue::{CueController, SilentCue};
use super::mutator::{MarkReadOutcome, MutationError, ReadStateMutator};
use super::poller::{
    PollCommand, PollHandle, PollLoop, ReconcileOutcome, Reconciler, DEFAULT_POLL_INTERVAL,
};
use super::relay::{spawn_relay_listener, SignalChannel};
use crate::inbox::{AccountId, MessageId, MessageStore, NoopSession, SessionRefresher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Builder for a [`ClientSession`]
pub struct ClientBuilder {
    account: AccountId,
    store: Arc<dyn MessageStore>,
    session: Arc<dyn SessionRefresher>,
    relay: Option<Arc<dyn SignalChannel>>,
    cue: Option<Arc<CueController>>,
    poll_interval: Duration,
}

impl ClientBuilder {
    pub fn new(account: AccountId, store: Arc<dyn MessageStore>) -> Self {
        Self {
            account,
            store,
            session: Arc::new(NoopSession),
            relay: None,
            cue: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_session(mut self, session: Arc<dyn SessionRefresher>) -> Self {
        self.session = session;
        self
    }

    pub fn with_relay(mut self, relay: Arc<dyn SignalChannel>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_cue(mut self, cue: Arc<CueController>) -> Self {
        self.cue = Some(cue);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wire everything up and start the poll loop and relay listener
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(self) -> ClientSession {
        let bus = Arc::new(match &self.relay {
            Some(relay) => SyncBus::with_relay(Arc::clone(relay)),
            None => SyncBus::new(),
        });

        let cue = self
            .cue
            .unwrap_or_else(|| Arc::new(CueController::new(Arc::new(SilentCue::new()))));
        let alert = Arc::new(AlertPolicy::new(cue));
        let observer = Arc::clone(&alert);
        let alert_subscription = bus.subscribe(move |event| {
            observer.observe(event);
        });

        let reconciler = Arc::new(Reconciler::new(
            self.account.clone(),
            self.store,
            self.session,
            Arc::clone(&bus),
        ));
        let mutator = ReadStateMutator::new(Arc::clone(&reconciler), Arc::clone(&alert));
        let poll = PollLoop::new(Arc::clone(&reconciler))
            .with_interval(self.poll_interval)
            .spawn();

        let relay_task = self.relay.as_ref().map(|relay| {
            let nudge = poll.sender();
            ListenerGuard(spawn_relay_listener(
                relay.watch(),
                Arc::clone(&bus),
                move |_| {
                    let _ = nudge.try_send(PollCommand::ReconcileNow {
                        force_refresh: false,
                    });
                },
            ))
        });

        tracing::info!(account = %self.account, relay = relay_task.is_some(), "Client session mounted");

        ClientSession {
            account: self.account,
            bus,
            alert,
            reconciler,
            mutator,
            poll,
            relay_task,
            _alert_subscription: alert_subscription,
        }
    }
}

/// A mounted client of one account
pub struct ClientSession {
    account: AccountId,
    bus: Arc<SyncBus>,
    alert: Arc<AlertPolicy>,
    reconciler: Arc<Reconciler>,
    mutator: ReadStateMutator,
    poll: PollHandle,
    relay_task: Option<ListenerGuard>,
    _alert_subscription: Subscription,
}

impl ClientSession {
    pub fn builder(account: AccountId, store: Arc<dyn MessageStore>) -> ClientBuilder {
        ClientBuilder::new(account, store)
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn bus(&self) -> &Arc<SyncBus> {
        &self.bus
    }

    pub fn alert(&self) -> &Arc<AlertPolicy> {
        &self.alert
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn mutator(&self) -> &ReadStateMutator {
        &self.mutator
    }

    pub fn poll(&self) -> &PollHandle {
        &self.poll
    }

    /// Subscribe to bus events, seeded with the current snapshot if any
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<BusEvent>) {
        self.reconciler.subscribe_seeded()
    }

    /// Reconcile now and wait for the result
    pub async fn reconcile_now(&self, force_refresh: bool) -> ReconcileOutcome {
        self.reconciler.reconcile(force_refresh).await
    }

    pub fn focus_regained(&self) {
        self.poll.focus_regained();
    }

    pub async fn mark_one_read(&self, id: &MessageId) -> Result<MarkReadOutcome, MutationError> {
        self.mutator.mark_one_read(id).await
    }

    pub async fn mark_all_read(&self) -> Result<MarkReadOutcome, MutationError> {
        self.mutator.mark_all_read().await
    }

    /// Tear down: stop the timer, drop in-flight results, stop listening
    pub async fn teardown(self) {
        drop(self.relay_task);
        tracing::info!(account = %self.account, "Client session torn down");
        self.poll.shutdown().await;
    }
}

/// Aborts the relay listener when dropped
struct ListenerGuard(JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
