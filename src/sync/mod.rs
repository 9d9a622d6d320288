//! Notification synchronization engine
//!
//! Keeps the unread badge and inbox list of every open client consistent
//! with the account store, without a push channel.
//!
//! # Flow
//!
//! ```text
//! store -> Reconciler -> SyncBus -> { AlertPolicy, presenters }
//!                           |
//!                           +-> SignalChannel -> other clients (count only)
//! ReadStateMutator -> store -> Reconciler
//! ```

pub mod alert;
pub mod bus;
pub mod client;
pub mod cue;
pub mod mutator;
pub mod poller;
pub mod relay;

pub use alert::{AlertDecision, AlertPolicy, AlertState, Suppression, Watermark};
pub use bus::{BusEvent, Subscription, SyncBus};
pub use client::{ClientBuilder, ClientSession};
pub use cue::{AudioCue, CueController, CueError, PlayOutcome, SilentCue, SoundPreference, TerminalBell};
pub use mutator::{MarkReadOutcome, MutationError, ReadStateMutator};
pub use poller::{
    PollCommand, PollHandle, PollLoop, ReconcileOutcome, Reconciler, DEFAULT_POLL_INTERVAL,
};
pub use relay::{
    spawn_relay_listener, FileSignalChannel, LocalSignalChannel, LocalSignalHub, RelayError,
    RelaySignal, SignalChannel, SignalWatcher,
};
