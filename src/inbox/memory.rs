//! In-memory message store
//!
//! Shared by every client in one process. Carries a small fault plan so the
//! engine can be exercised against an unreliable store: failing fetches,
//! malformed responses, rejected writes and slow responses that arrive out of
//! order.

use super::store::{MessageStore, Result, StoreError};
use super::{AccountId, AccountSnapshot, Message};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct FaultPlan {
    /// Number of upcoming fetches that fail as unavailable
    failing_fetches: usize,
    /// Number of upcoming fetches that fail as malformed
    malformed_fetches: usize,
    /// Reject every write while set
    reject_writes: bool,
    /// Per-fetch delays, consumed in call order
    fetch_delays: VecDeque<Duration>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<AccountId, Vec<Message>>,
    faults: FaultPlan,
    fetches: usize,
    writes: usize,
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty snapshot for an account (idempotent)
    pub fn provision(&self, account: &AccountId) {
        self.lock().accounts.entry(account.clone()).or_default();
    }

    /// Overwrite an account's messages without going through the trait
    pub fn set_messages(&self, account: &AccountId, messages: Vec<Message>) {
        self.lock().accounts.insert(account.clone(), messages);
    }

    /// Current messages for an account, if provisioned
    pub fn messages(&self, account: &AccountId) -> Option<Vec<Message>> {
        self.lock().accounts.get(account).cloned()
    }

    /// Fail the next `n` fetches as unavailable
    pub fn fail_next_fetches(&self, n: usize) {
        self.lock().faults.failing_fetches = n;
    }

    /// Return a malformed response for the next `n` fetches
    pub fn malform_next_fetches(&self, n: usize) {
        self.lock().faults.malformed_fetches = n;
    }

    /// Reject writes until switched off again
    pub fn reject_writes(&self, reject: bool) {
        self.lock().faults.reject_writes = reject;
    }

    /// Queue a delay for an upcoming fetch
    ///
    /// The snapshot is captured before the delay, so a delayed response
    /// carries the state of the store at the time the request was made.
    pub fn delay_next_fetch(&self, delay: Duration) {
        self.lock().faults.fetch_delays.push_back(delay);
    }

    /// Total fetches served (including failed ones)
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    /// Total successful writes
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn get_snapshot(&self, account: &AccountId) -> Result<AccountSnapshot> {
        let (result, delay) = {
            let mut inner = self.lock();
            inner.fetches += 1;
            let delay = inner.faults.fetch_delays.pop_front();

            let result = if inner.faults.failing_fetches > 0 {
                inner.faults.failing_fetches -= 1;
                Err(StoreError::Unavailable("memory store offline".to_string()))
            } else if inner.faults.malformed_fetches > 0 {
                inner.faults.malformed_fetches -= 1;
                Err(StoreError::Malformed(
                    "memory store returned garbage".to_string(),
                ))
            } else {
                inner
                    .accounts
                    .get(account)
                    .map(|messages| AccountSnapshot::new(messages.clone()))
                    .ok_or_else(|| StoreError::AccountNotFound(account.to_string()))
            };
            (result, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn replace_messages(&self, account: &AccountId, messages: Vec<Message>) -> Result<()> {
        let mut inner = self.lock();
        if inner.faults.reject_writes {
            return Err(StoreError::Rejected("memory store is read-only".to_string()));
        }
        match inner.accounts.get_mut(account) {
            Some(slot) => {
                *slot = messages;
                inner.writes += 1;
                Ok(())
            }
            None => Err(StoreError::AccountNotFound(account.to_string())),
        }
    }
}
