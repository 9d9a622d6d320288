//! Read-state mutator
//!
//! Flips unread flags by reading the whole snapshot, editing it, and writing
//! the whole list back. The store has no compare-and-swap, so an external
//! append that lands between the read and the write is overwritten and lost.
//! That race is known and left as is.
//!
//! Only a successful write arms own-action suppression on the alert policy,
//! followed by an immediate reconcile, so the change reaches every subscriber
//! without a cue.

use super::alert::AlertPolicy;
use super::poller::{ReconcileOutcome, Reconciler};
use crate::inbox::{Message, MessageId, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Mutation errors
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("failed to read snapshot: {0}")]
    Read(#[source] StoreError),

    #[error("failed to write messages: {0}")]
    Write(#[source] StoreError),
}

/// What a mutation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    /// The list was written back
    Updated {
        /// Number of messages that went from unread to read
        flipped: usize,
        /// Result of the follow-up reconcile
        reconcile: ReconcileOutcome,
    },
    /// Nothing to flip; nothing was written
    Unchanged,
}

/// Marks messages read for one session
pub struct ReadStateMutator {
    reconciler: Arc<Reconciler>,
    alert: Arc<AlertPolicy>,
}

impl ReadStateMutator {
    pub fn new(reconciler: Arc<Reconciler>, alert: Arc<AlertPolicy>) -> Self {
        Self { reconciler, alert }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Mark a single message read
    pub async fn mark_one_read(&self, id: &MessageId) -> Result<MarkReadOutcome, MutationError> {
        self.apply("one", |messages| {
            let mut flipped = 0;
            for message in messages.iter_mut().filter(|m| &m.id == id && m.unread) {
                message.unread = false;
                flipped += 1;
            }
            flipped
        })
        .await
    }

    /// Mark every message read
    pub async fn mark_all_read(&self) -> Result<MarkReadOutcome, MutationError> {
        self.apply("all", |messages| {
            let mut flipped = 0;
            for message in messages.iter_mut().filter(|m| m.unread) {
                message.unread = false;
                flipped += 1;
            }
            flipped
        })
        .await
    }

    async fn apply<F>(&self, scope: &'static str, flip: F) -> Result<MarkReadOutcome, MutationError>
    where
        F: FnOnce(&mut [Message]) -> usize,
    {
        let account = self.reconciler.account();
        let store = self.reconciler.store();

        let snapshot = store
            .get_snapshot(account)
            .await
            .map_err(MutationError::Read)?;
        let mut messages = snapshot.messages;

        let flipped = flip(&mut messages);
        if flipped == 0 {
            tracing::debug!(account = %account, scope, "Nothing to mark read");
            crate::metrics::record_mutation(scope, "unchanged");
            return Ok(MarkReadOutcome::Unchanged);
        }

        if let Err(e) = store.replace_messages(account, messages).await {
            crate::metrics::record_mutation(scope, "failed");
            tracing::warn!(account = %account, scope, error = %e, "Mark read failed");
            return Err(MutationError::Write(e));
        }
        self.alert.suppress_next();

        crate::metrics::record_mutation(scope, "updated");
        tracing::info!(account = %account, scope, flipped, "Marked messages read");

        let reconcile = self.reconciler.reconcile(false).await;
        if !matches!(reconcile, ReconcileOutcome::Changed { .. }) {
            // Either the poll loop already published this write or nothing will
            self.alert.release_suppression();
        }
        Ok(MarkReadOutcome::Updated { flipped, reconcile })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::{AccountId, MemoryStore, MessageKind, NoopSession};
    use crate::sync::bus::SyncBus;
    use crate::sync::cue::{CueController, SilentCue};

    struct Fixture {
        store: Arc<MemoryStore>,
        account: AccountId,
        alert: Arc<AlertPolicy>,
        mutator: ReadStateMutator,
        _sub: crate::sync::Subscription,
    }

    fn fixture(messages: Vec<Message>) -> Fixture {
        let account = AccountId::new("acct-1");
        let store = Arc::new(MemoryStore::new());
        store.set_messages(&account, messages);

        let bus = Arc::new(SyncBus::new());
        let cue = Arc::new(CueController::new(Arc::new(SilentCue::new())));
        cue.arm();
        let alert = Arc::new(AlertPolicy::new(cue));
        let observer = alert.clone();
        let sub = bus.subscribe(move |e| {
            observer.observe(e);
        });

        let reconciler = Arc::new(Reconciler::new(
            account.clone(),
            store.clone(),
            Arc::new(NoopSession),
            bus,
        ));
        Fixture {
            store,
            account,
            alert: alert.clone(),
            mutator: ReadStateMutator::new(reconciler, alert),
            _sub: sub,
        }
    }

    fn unread(id: &str) -> Message {
        Message::new(MessageKind::Admin, id).with_id(id)
    }

    #[tokio::test]
    async fn test_mark_one_read() {
        let f = fixture(vec![unread("m2"), unread("m1")]);

        let outcome = f
            .mutator
            .mark_one_read(&MessageId::from_string("m1"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            MarkReadOutcome::Updated {
                flipped: 1,
                reconcile: ReconcileOutcome::Changed { unread: 1 }
            }
        ));

        let messages = f.store.messages(&f.account).unwrap();
        assert!(messages[0].unread);
        assert!(!messages[1].unread);
    }

    #[tokio::test]
    async fn test_no_op_writes_nothing() {
        let f = fixture(vec![unread("m1").read()]);

        let outcome = f
            .mutator
            .mark_one_read(&MessageId::from_string("missing"))
            .await
            .unwrap();
        assert_eq!(outcome, MarkReadOutcome::Unchanged);
        assert_eq!(f.mutator.mark_all_read().await.unwrap(), MarkReadOutcome::Unchanged);
        assert_eq!(f.store.write_count(), 0);
        assert_eq!(f.alert.state().suppression, crate::sync::Suppression::Idle);
    }

    #[tokio::test]
    async fn test_mark_all_read_is_idempotent() {
        let f = fixture(vec![unread("m2"), unread("m1")]);

        assert!(matches!(
            f.mutator.mark_all_read().await.unwrap(),
            MarkReadOutcome::Updated { flipped: 2, .. }
        ));
        let after_first = f.store.messages(&f.account).unwrap();

        assert_eq!(f.mutator.mark_all_read().await.unwrap(), MarkReadOutcome::Unchanged);
        assert_eq!(f.store.messages(&f.account).unwrap(), after_first);
        assert_eq!(f.store.write_count(), 1);
    }

    /// Records the suppression state seen while the write is in progress
    struct ObservedWrite {
        inner: Arc<MemoryStore>,
        alert: std::sync::Mutex<Option<Arc<AlertPolicy>>>,
        seen: std::sync::Mutex<Vec<crate::sync::Suppression>>,
    }

    #[async_trait::async_trait]
    impl crate::inbox::MessageStore for ObservedWrite {
        async fn get_snapshot(
            &self,
            account: &AccountId,
        ) -> crate::inbox::StoreResult<crate::inbox::AccountSnapshot> {
            self.inner.get_snapshot(account).await
        }

        async fn replace_messages(
            &self,
            account: &AccountId,
            messages: Vec<Message>,
        ) -> crate::inbox::StoreResult<()> {
            let alert = self.alert.lock().unwrap().clone();
            if let Some(alert) = alert {
                self.seen.lock().unwrap().push(alert.state().suppression);
            }
            self.inner.replace_messages(account, messages).await
        }
    }

    #[tokio::test]
    async fn test_suppression_armed_only_after_write() {
        let account = AccountId::new("acct-1");
        let inner = Arc::new(MemoryStore::new());
        inner.set_messages(&account, vec![unread("m1")]);
        let store = Arc::new(ObservedWrite {
            inner,
            alert: std::sync::Mutex::new(None),
            seen: std::sync::Mutex::new(Vec::new()),
        });

        let alert = Arc::new(AlertPolicy::new(Arc::new(CueController::new(Arc::new(
            SilentCue::new(),
        )))));
        *store.alert.lock().unwrap() = Some(alert.clone());
        let reconciler = Arc::new(Reconciler::new(
            account,
            store.clone(),
            Arc::new(NoopSession),
            Arc::new(SyncBus::new()),
        ));
        let mutator = ReadStateMutator::new(reconciler, alert.clone());

        mutator.mark_all_read().await.unwrap();
        assert_eq!(
            *store.seen.lock().unwrap(),
            vec![crate::sync::Suppression::Idle]
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_suppression_idle() {
        let f = fixture(vec![unread("m1")]);
        f.store.reject_writes(true);

        let err = f.mutator.mark_all_read().await.unwrap_err();
        assert!(matches!(err, MutationError::Write(StoreError::Rejected(_))));
        assert_eq!(f.alert.state().suppression, crate::sync::Suppression::Idle);
        assert!(f.store.messages(&f.account).unwrap()[0].unread);
    }

    #[tokio::test]
    async fn test_failed_read_surfaces() {
        let f = fixture(vec![unread("m1")]);
        f.store.fail_next_fetches(1);

        let err = f.mutator.mark_all_read().await.unwrap_err();
        assert!(matches!(err, MutationError::Read(_)));
    }
}
