//! End-to-end client scenarios against an in-memory store

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use inbox_sync::inbox::{
    append_message, AccountId, AccountSnapshot, MemoryStore, Message, MessageId, MessageKind,
    MessageStore, StoreResult,
};
use inbox_sync::presenter::BadgePresenter;
use inbox_sync::sync::{
    BusEvent, ClientSession, CueController, FileSignalChannel, LocalSignalHub, MarkReadOutcome,
    ReconcileOutcome, SilentCue, Suppression,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Long enough that the timer never fires during a test
const IDLE: Duration = Duration::from_secs(3600);

fn account() -> AccountId {
    AccountId::new("acct-1")
}

fn armed_cue() -> (Arc<CueController>, Arc<SilentCue>) {
    let sound = Arc::new(SilentCue::new());
    let cue = Arc::new(CueController::new(sound.clone()));
    cue.arm();
    (cue, sound)
}

fn mount(store: Arc<dyn MessageStore>, cue: Arc<CueController>) -> ClientSession {
    ClientSession::builder(account(), store)
        .with_cue(cue)
        .with_poll_interval(IDLE)
        .mount()
}

#[tokio::test]
async fn scenario_a_empty_store_mark_all_is_noop() {
    let store = Arc::new(MemoryStore::new());
    store.provision(&account());
    let (cue, sound) = armed_cue();
    let session = mount(store.clone(), cue);

    session.reconcile_now(false).await;
    assert_eq!(
        session.mark_all_read().await.unwrap(),
        MarkReadOutcome::Unchanged
    );

    assert_eq!(session.reconciler().snapshot().unwrap().unread_count(), 0);
    assert_eq!(session.alert().unread(), 0);
    assert_eq!(store.write_count(), 0);
    assert_eq!(sound.plays(), 0);
    session.teardown().await;
}

#[tokio::test]
async fn scenario_b_and_c_cue_plays_once_per_new_message() {
    let t1 = Utc::now() - ChronoDuration::hours(1);
    let store = Arc::new(MemoryStore::new());
    store.set_messages(
        &account(),
        vec![Message::new(MessageKind::Admin, "welcome")
            .with_id("m1")
            .with_created_at(t1)],
    );
    let (cue, sound) = armed_cue();
    let session = mount(store.clone(), cue);

    // B: first reconcile announces, second is silent
    assert_eq!(
        session.reconcile_now(false).await,
        ReconcileOutcome::Changed { unread: 1 }
    );
    assert_eq!(session.alert().watermark(), Some(t1));
    assert_eq!(sound.plays(), 1);

    session.reconcile_now(false).await;
    assert_eq!(session.alert().unread(), 1);
    assert_eq!(sound.plays(), 1);

    // C: external append of a newer message
    let m2 = Message::new(MessageKind::Rejection, "declined").with_id("m2");
    let t2 = m2.created_at;
    append_message(store.as_ref(), &account(), m2).await.unwrap();

    assert_eq!(
        session.reconcile_now(false).await,
        ReconcileOutcome::Changed { unread: 2 }
    );
    assert_eq!(sound.plays(), 2);
    assert_eq!(session.alert().watermark(), Some(t2));

    session.reconcile_now(false).await;
    assert_eq!(sound.plays(), 2);
    session.teardown().await;
}

#[tokio::test]
async fn own_mutations_never_cue() {
    let store = Arc::new(MemoryStore::new());
    store.set_messages(
        &account(),
        vec![
            Message::new(MessageKind::Admin, "b").with_id("m2"),
            Message::new(MessageKind::Admin, "a").with_id("m1"),
        ],
    );
    let (cue, sound) = armed_cue();
    let session = mount(store.clone(), cue);
    session.reconcile_now(false).await;
    assert_eq!(sound.plays(), 1);

    session
        .mark_one_read(&MessageId::from_string("m1"))
        .await
        .unwrap();
    session.mark_all_read().await.unwrap();

    assert_eq!(sound.plays(), 1);
    assert_eq!(session.alert().unread(), 0);
    assert_eq!(session.alert().state().suppression, Suppression::Idle);
    session.teardown().await;
}

/// Lets an external append land between the mutator's read and its write
struct RacingStore {
    inner: Arc<MemoryStore>,
    pending_append: Mutex<Option<Message>>,
}

#[async_trait]
impl MessageStore for RacingStore {
    async fn get_snapshot(&self, account: &AccountId) -> StoreResult<AccountSnapshot> {
        self.inner.get_snapshot(account).await
    }

    async fn replace_messages(&self, account: &AccountId, messages: Vec<Message>) -> StoreResult<()> {
        let pending = self.pending_append.lock().unwrap().take();
        if let Some(message) = pending {
            append_message(self.inner.as_ref(), account, message).await?;
        }
        self.inner.replace_messages(account, messages).await
    }
}

#[tokio::test]
async fn scenario_d_concurrent_append_is_lost_last_writer_wins() {
    let inner = Arc::new(MemoryStore::new());
    inner.set_messages(
        &account(),
        vec![Message::new(MessageKind::Admin, "first").with_id("m1")],
    );
    let racing = Arc::new(RacingStore {
        inner: inner.clone(),
        pending_append: Mutex::new(None),
    });
    let (cue, _) = armed_cue();
    let session = mount(racing.clone(), cue);
    session.reconcile_now(false).await;

    *racing.pending_append.lock().unwrap() =
        Some(Message::new(MessageKind::Admin, "second").with_id("m2"));
    session
        .mark_one_read(&MessageId::from_string("m1"))
        .await
        .unwrap();

    // The whole-list write was based on a snapshot without m2, so m2 is gone
    let messages = inner.messages(&account()).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id.as_str(), "m1");
    assert!(!messages[0].unread);

    let snapshot = session.reconciler().snapshot().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.unread_count(), 0);
    session.teardown().await;
}

async fn wait_for_count(rx: &mut tokio::sync::mpsc::UnboundedReceiver<BusEvent>, count: usize) -> Vec<BusEvent> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = rx.recv().await {
            let done = event.unread_count == count;
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .expect("timed out waiting for relay");
    seen
}

#[tokio::test]
async fn scenario_e_relay_updates_other_client_without_user_fetch() {
    let store = Arc::new(MemoryStore::new());
    store.set_messages(
        &account(),
        vec![
            Message::new(MessageKind::Admin, "b").with_id("m2"),
            Message::new(MessageKind::Admin, "a").with_id("m1"),
        ],
    );
    let hub = LocalSignalHub::new();

    let (cue_a, _) = armed_cue();
    let (cue_b, sound_b) = armed_cue();
    let a = ClientSession::builder(account(), store.clone())
        .with_cue(cue_a)
        .with_relay(Arc::new(hub.channel()))
        .with_poll_interval(IDLE)
        .mount();
    let b = ClientSession::builder(account(), store.clone())
        .with_cue(cue_b)
        .with_relay(Arc::new(hub.channel()))
        .with_poll_interval(IDLE)
        .mount();

    a.reconcile_now(false).await;
    b.reconcile_now(false).await;
    // Let both poll loops and relay listeners settle
    tokio::time::sleep(Duration::from_millis(50)).await;
    let plays_before = sound_b.plays();

    let (_sub, mut b_events) = b.subscribe_channel();
    let mut badge = BadgePresenter::new();
    badge.apply(&b_events.recv().await.unwrap());
    assert_eq!(badge.unread(), 2);

    a.mark_all_read().await.unwrap();

    // First the count-only relay, then B's own reconcile
    let events = wait_for_count(&mut b_events, 0).await;
    for event in &events {
        badge.apply(event);
    }
    assert_eq!(badge.unread(), 0);
    assert!(events.last().unwrap().is_count_only());

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if b.reconciler()
                .snapshot()
                .is_some_and(|s| s.unread_count() == 0)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("B never reconciled");

    assert_eq!(sound_b.plays(), plays_before);
    a.teardown().await;
    b.teardown().await;
}

#[tokio::test]
async fn scenario_e_over_shared_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let relay_path = dir.path().join("relay.json");
    let store = Arc::new(MemoryStore::new());
    store.set_messages(
        &account(),
        vec![Message::new(MessageKind::Admin, "a").with_id("m1")],
    );

    let file_channel =
        || Arc::new(FileSignalChannel::new(&relay_path).with_poll_interval(Duration::from_millis(20)));
    let (cue_a, _) = armed_cue();
    let (cue_b, _) = armed_cue();
    let a = ClientSession::builder(account(), store.clone())
        .with_cue(cue_a)
        .with_relay(file_channel())
        .with_poll_interval(IDLE)
        .mount();
    let b = ClientSession::builder(account(), store.clone())
        .with_cue(cue_b)
        .with_relay(file_channel())
        .with_poll_interval(IDLE)
        .mount();

    b.reconcile_now(false).await;
    let (_sub, mut b_events) = b.subscribe_channel();
    assert_eq!(b_events.recv().await.unwrap().unread_count, 1);
    // Let the file watchers take their baseline
    tokio::time::sleep(Duration::from_millis(60)).await;

    a.mark_all_read().await.unwrap();
    wait_for_count(&mut b_events, 0).await;

    a.teardown().await;
    b.teardown().await;
}

#[tokio::test]
async fn teardown_stops_polling() {
    let store = Arc::new(MemoryStore::new());
    store.provision(&account());
    let (cue, _) = armed_cue();
    let session = ClientSession::builder(account(), store.clone())
        .with_cue(cue)
        .with_poll_interval(Duration::from_millis(10))
        .mount();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.fetch_count() >= 2);

    let reconciler = Arc::clone(session.reconciler());
    session.teardown().await;
    assert!(!reconciler.is_attached());

    let fetches = store.fetch_count();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.fetch_count(), fetches);
}

#[tokio::test]
async fn mark_all_read_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    store.set_messages(
        &account(),
        vec![
            Message::new(MessageKind::Admin, "b").with_id("m2"),
            Message::new(MessageKind::Admin, "a").with_id("m1").read(),
        ],
    );
    let (cue, _) = armed_cue();
    let session = mount(store.clone(), cue);
    session.reconcile_now(false).await;

    let first = session.mark_all_read().await.unwrap();
    assert!(matches!(first, MarkReadOutcome::Updated { flipped: 1, .. }));
    let writes = store.write_count();
    let after_first = store.messages(&account()).unwrap();

    assert_eq!(
        session.mark_all_read().await.unwrap(),
        MarkReadOutcome::Unchanged
    );
    assert_eq!(store.write_count(), writes);
    assert_eq!(store.messages(&account()).unwrap(), after_first);
    assert_eq!(session.alert().state().suppression, Suppression::Idle);
    session.teardown().await;
}
