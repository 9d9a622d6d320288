//! Cross-client relay
//!
//! Clients of the same account share a tiny key-value signal: the time of the
//! last change and the unread count. Nothing else ever crosses the client
//! boundary; a client that wants message bodies reconciles against the store
//! itself.
//!
//! Two transports are provided:
//!
//! - [`LocalSignalHub`] - In-memory broker for clients living in one process
//! - [`FileSignalChannel`] - A JSON file shared by processes on one machine,
//!   polled for changes
//!
//! Neither gives any ordering guarantee across clients. A writer never sees
//! its own signals come back.

use super::bus::{BusEvent, SyncBus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Capacity of the in-process broadcast used by both transports
const RELAY_CHANNEL_CAPACITY: usize = 64;

/// Default polling interval for [`FileSignalChannel`]
pub const DEFAULT_FILE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("relay encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// The only payload allowed across clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RelaySignal {
    pub timestamp: DateTime<Utc>,
    pub unread_count: usize,
}

impl RelaySignal {
    pub fn now(unread_count: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            unread_count,
        }
    }

    pub fn encode(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// A raw payload tagged with the client that wrote it
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: u64,
    pub payload: String,
}

/// Stream of signals written by other clients
pub struct SignalWatcher {
    rx: broadcast::Receiver<Envelope>,
    skip_origin: Option<u64>,
}

impl SignalWatcher {
    /// Wait for the next foreign signal; `None` once the transport is gone
    pub async fn recv(&mut self) -> Option<RelaySignal> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => {
                    if Some(envelope.origin) == self.skip_origin {
                        continue;
                    }
                    match RelaySignal::decode(&envelope.payload) {
                        Ok(signal) => return Some(signal),
                        Err(e) => {
                            tracing::warn!(error = %e, "Ignoring undecodable relay signal");
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Only the latest count matters, so dropping older ones is fine
                    tracing::debug!(skipped, "Relay watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Same-origin signal transport
pub trait SignalChannel: Send + Sync {
    /// Publish a signal to every other client
    fn write(&self, signal: RelaySignal) -> Result<(), RelayError>;

    /// Last signal written by anyone, if any
    fn latest(&self) -> Option<RelaySignal>;

    /// Subscribe to signals written by other clients
    fn watch(&self) -> SignalWatcher;
}

// ============================================================================
// In-memory hub
// ============================================================================

/// In-memory broker shared by clients in one process
#[derive(Debug)]
pub struct LocalSignalHub {
    tx: broadcast::Sender<Envelope>,
    latest: Mutex<Option<String>>,
    next_client: AtomicU64,
}

impl LocalSignalHub {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(RELAY_CHANNEL_CAPACITY);
        Arc::new(Self {
            tx,
            latest: Mutex::new(None),
            next_client: AtomicU64::new(1),
        })
    }

    /// Open a channel handle for one client
    pub fn channel(self: &Arc<Self>) -> LocalSignalChannel {
        LocalSignalChannel {
            hub: Arc::clone(self),
            origin: self.next_client.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Observe every raw payload written to the hub, from any client
    pub fn tap(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Raw value currently held under the shared key
    pub fn latest_raw(&self) -> Option<String> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// One client's handle on a [`LocalSignalHub`]
#[derive(Debug, Clone)]
pub struct LocalSignalChannel {
    hub: Arc<LocalSignalHub>,
    origin: u64,
}

impl LocalSignalChannel {
    pub fn origin(&self) -> u64 {
        self.origin
    }
}

impl SignalChannel for LocalSignalChannel {
    fn write(&self, signal: RelaySignal) -> Result<(), RelayError> {
        let payload = signal.encode()?;
        *self
            .hub
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(payload.clone());

        // No receivers just means no other client is listening yet
        let _ = self.hub.tx.send(Envelope {
            origin: self.origin,
            payload,
        });
        Ok(())
    }

    fn latest(&self) -> Option<RelaySignal> {
        self.hub
            .latest_raw()
            .and_then(|raw| RelaySignal::decode(&raw).ok())
    }

    fn watch(&self) -> SignalWatcher {
        SignalWatcher {
            rx: self.hub.tx.subscribe(),
            skip_origin: Some(self.origin),
        }
    }
}

// ============================================================================
// Shared file
// ============================================================================

/// Signal channel backed by one JSON file on the local machine
///
/// Each process polls the file and forwards content it has not seen and did
/// not write itself. Every write goes through its own temporary file and a
/// rename, so concurrent writers never share a temp path and readers never
/// see a torn payload.
pub struct FileSignalChannel {
    path: PathBuf,
    poll_interval: Duration,
    last_written: Arc<Mutex<Option<String>>>,
}

impl FileSignalChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_FILE_POLL_INTERVAL,
            last_written: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_payload(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

impl SignalChannel for FileSignalChannel {
    fn write(&self, signal: RelaySignal) -> Result<(), RelayError> {
        let payload = signal.encode()?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        // Each write gets its own temporary file in the same directory
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(payload.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| RelayError::Io(e.error))?;

        *self
            .last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(payload);
        Ok(())
    }

    fn latest(&self) -> Option<RelaySignal> {
        read_payload(&self.path).and_then(|raw| RelaySignal::decode(&raw).ok())
    }

    fn watch(&self) -> SignalWatcher {
        let (tx, rx) = broadcast::channel(RELAY_CHANNEL_CAPACITY);
        let path = self.path.clone();
        let last_written = Arc::clone(&self.last_written);
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Whatever is on disk at subscribe time is history, not a change
            let mut last_seen = read_payload(&path);

            loop {
                interval.tick().await;
                if tx.receiver_count() == 0 {
                    break;
                }

                let current = read_payload(&path);
                if current == last_seen {
                    continue;
                }
                last_seen = current.clone();

                let Some(payload) = current else { continue };
                let own = last_written
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_deref()
                    == Some(payload.as_str());
                if own {
                    continue;
                }
                let _ = tx.send(Envelope { origin: 0, payload });
            }
            tracing::debug!(path = %path.display(), "Relay file watcher stopped");
        });

        SignalWatcher {
            rx,
            skip_origin: None,
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Re-publish foreign signals on the local bus
///
/// Every signal becomes a count-only [`BusEvent`] delivered to local
/// subscribers only (never written back to the channel), then `on_signal` is
/// called so the caller can schedule a full reconcile.
pub fn spawn_relay_listener<F>(
    mut watcher: SignalWatcher,
    bus: Arc<SyncBus>,
    on_signal: F,
) -> JoinHandle<()>
where
    F: Fn(RelaySignal) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(signal) = watcher.recv().await {
            tracing::debug!(
                unread = signal.unread_count,
                at = %signal.timestamp,
                "Relay signal received"
            );
            crate::metrics::record_relay("received");
            bus.publish_local(BusEvent::count_only(signal.unread_count));
            on_signal(signal);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_signal_wire_format() {
        let signal = RelaySignal::now(3);
        let raw = signal.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 2);
        assert!(value.get("timestamp").is_some());
        assert_eq!(value["unreadCount"], 3);
    }

    #[test]
    fn test_signal_rejects_extra_fields() {
        let raw = r#"{"timestamp":"2024-01-01T00:00:00Z","unreadCount":1,"text":"secret"}"#;
        assert!(RelaySignal::decode(raw).is_err());
    }

    #[tokio::test]
    async fn test_local_hub_skips_own_writes() {
        let hub = LocalSignalHub::new();
        let a = hub.channel();
        let b = hub.channel();
        assert_ne!(a.origin(), b.origin());

        let mut a_watch = a.watch();
        let mut b_watch = b.watch();

        a.write(RelaySignal::now(4)).unwrap();

        let received = b_watch.recv().await.unwrap();
        assert_eq!(received.unread_count, 4);
        assert_eq!(b.latest().unwrap().unread_count, 4);

        // A only sees B's writes
        b.write(RelaySignal::now(5)).unwrap();
        assert_eq!(a_watch.recv().await.unwrap().unread_count, 5);
    }

    #[test]
    fn test_concurrent_file_writers_never_tear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.json");

        std::thread::scope(|scope| {
            let writers: Vec<_> = (0..2)
                .map(|n| {
                    let channel = FileSignalChannel::new(&path);
                    scope.spawn(move || {
                        let mut failed = 0;
                        for i in 0..500 {
                            if channel.write(RelaySignal::now(n * 1000 + i)).is_err() {
                                failed += 1;
                            }
                        }
                        failed
                    })
                })
                .collect();

            let reader = FileSignalChannel::new(&path);
            for _ in 0..500 {
                if let Some(raw) = read_payload(reader.path()) {
                    assert!(RelaySignal::decode(&raw).is_ok(), "torn payload: {}", raw);
                }
            }

            for writer in writers {
                assert_eq!(writer.join().unwrap(), 0);
            }
        });

        assert!(FileSignalChannel::new(&path).latest().is_some());
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_channel_relays_between_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.json");
        let a = FileSignalChannel::new(&path).with_poll_interval(Duration::from_millis(50));
        let b = FileSignalChannel::new(&path).with_poll_interval(Duration::from_millis(50));

        let mut a_watch = a.watch();
        let mut b_watch = b.watch();
        tokio::time::sleep(Duration::from_millis(60)).await;

        a.write(RelaySignal::now(2)).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), b_watch.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.unread_count, 2);
        assert_eq!(b.latest().unwrap().unread_count, 2);

        // The writer does not hear its own signal
        let own = tokio::time::timeout(Duration::from_millis(200), a_watch.recv()).await;
        assert!(own.is_err());
    }
}
