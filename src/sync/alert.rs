//! Alert policy
//!
//! Decides, per bus event, whether new content deserves the audible cue, and
//! tracks the visual "ringing" state. All state is per session and lives in
//! one [`AlertPolicy`]; a new policy is a remount.
//!
//! The cue fires for a full event only when every condition holds:
//!
//! 1. the unread count or the total message count grew since the last full
//!    event
//! 2. the session is not suppressing its own action
//! 3. the newest message is strictly newer than the watermark
//! 4. sound is enabled
//!
//! The watermark only moves when content is announced. Count-only relay
//! events update the ringing count and nothing else.

use super::bus::BusEvent;
use super::cue::{CueController, PlayOutcome};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Newest timestamp already announced in this session
pub type Watermark = Option<DateTime<Utc>>;

/// Own-action suppression, a two-state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Suppression {
    #[default]
    Idle,
    /// The next full event came from this session's own mutation
    Suppressing,
}

/// Per-session alert state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertState {
    /// Newest timestamp already announced
    pub watermark: Watermark,
    pub suppression: Suppression,
    /// Notification surface opened this session
    pub acknowledged: bool,
    /// Unread count seen on the last full event
    pub last_unread: usize,
    /// Message count seen on the last full event
    pub last_total: usize,
    /// Latest known unread count, from any event
    pub unread: usize,
}

/// What the policy did with one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// New content; the cue was asked to play
    Announced(PlayOutcome),
    /// New content, but it was this session's own action
    Suppressed,
    /// New content, but sound is switched off
    Muted,
    /// Nothing grew, or nothing is newer than the watermark
    NothingNew,
    /// Relay event; only the count was taken
    CountOnly,
}

impl AlertDecision {
    pub fn is_announced(&self) -> bool {
        matches!(self, AlertDecision::Announced(_))
    }
}

/// Alert policy for one client session
pub struct AlertPolicy {
    state: Mutex<AlertState>,
    cue: Arc<CueController>,
}

impl AlertPolicy {
    pub fn new(cue: Arc<CueController>) -> Self {
        Self {
            state: Mutex::new(AlertState::default()),
            cue,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AlertState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cue(&self) -> &Arc<CueController> {
        &self.cue
    }

    /// Copy of the current state
    pub fn state(&self) -> AlertState {
        self.lock().clone()
    }

    pub fn watermark(&self) -> Watermark {
        self.lock().watermark
    }

    pub fn unread(&self) -> usize {
        self.lock().unread
    }

    /// Evaluate one bus event
    pub fn observe(&self, event: &BusEvent) -> AlertDecision {
        let decision = {
            let mut state = self.lock();
            state.unread = event.unread_count;

            let Some(messages) = event.messages.as_deref() else {
                return AlertDecision::CountOnly;
            };

            let grew = event.unread_count > state.last_unread || messages.len() > state.last_total;
            let newest = event.max_timestamp();
            let newer = match (newest, state.watermark) {
                (Some(newest), Some(watermark)) => newest > watermark,
                (Some(_), None) => true,
                (None, _) => false,
            };

            let decision = if !grew {
                AlertDecision::NothingNew
            } else if state.suppression == Suppression::Suppressing {
                AlertDecision::Suppressed
            } else if !newer {
                AlertDecision::NothingNew
            } else if !self.cue.is_enabled() {
                AlertDecision::Muted
            } else {
                // Outcome filled in once the lock is released
                state.watermark = newest;
                AlertDecision::Announced(PlayOutcome::Blocked)
            };

            state.last_unread = event.unread_count;
            state.last_total = messages.len();
            state.suppression = Suppression::Idle;
            decision
        };

        let decision = match decision {
            AlertDecision::Announced(_) => AlertDecision::Announced(self.cue.play()),
            other => other,
        };
        tracing::debug!(unread = event.unread_count, decision = ?decision, "Alert evaluated");
        decision
    }

    /// Visual alert: unread content the user has not acknowledged
    pub fn is_ringing(&self) -> bool {
        let state = self.lock();
        state.unread > 0 && !state.acknowledged
    }

    /// The notification surface was opened; stop ringing for this session
    pub fn acknowledge(&self) {
        self.lock().acknowledged = true;
    }

    /// Suppress the cue for the next full event (own mutation)
    pub fn suppress_next(&self) {
        self.lock().suppression = Suppression::Suppressing;
    }

    /// Drop a pending suppression (the mutation it covered failed)
    pub fn release_suppression(&self) {
        self.lock().suppression = Suppression::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::{AccountSnapshot, Message, MessageKind};
    use crate::sync::cue::SilentCue;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn msg(id: &str, secs: i64, unread: bool) -> Message {
        let m = Message::new(MessageKind::Admin, id)
            .with_id(id)
            .with_created_at(at(secs));
        if unread {
            m
        } else {
            m.read()
        }
    }

    fn full(messages: Vec<Message>) -> BusEvent {
        BusEvent::full(AccountSnapshot::new(messages))
    }

    fn armed_policy() -> (AlertPolicy, Arc<SilentCue>) {
        let cue = Arc::new(SilentCue::new());
        let controller = Arc::new(CueController::new(cue.clone()));
        controller.arm();
        (AlertPolicy::new(controller), cue)
    }

    #[test]
    fn test_first_and_repeated_snapshot() {
        let (policy, cue) = armed_policy();
        let event = full(vec![msg("m1", 1, true)]);

        assert_eq!(
            policy.observe(&event),
            AlertDecision::Announced(PlayOutcome::Played)
        );
        assert_eq!(policy.watermark(), Some(at(1)));

        assert_eq!(policy.observe(&event), AlertDecision::NothingNew);
        assert_eq!(cue.plays(), 1);
        assert_eq!(policy.watermark(), Some(at(1)));
    }

    #[test]
    fn test_new_message_advances_watermark() {
        let (policy, cue) = armed_policy();
        policy.observe(&full(vec![msg("m1", 1, true)]));
        let decision = policy.observe(&full(vec![msg("m2", 2, true), msg("m1", 1, true)]));

        assert!(decision.is_announced());
        assert_eq!(policy.watermark(), Some(at(2)));
        assert_eq!(cue.plays(), 2);
    }

    #[test]
    fn test_growth_without_newer_content_is_silent() {
        let (policy, cue) = armed_policy();
        policy.observe(&full(vec![msg("m2", 2, true)]));
        // An older message shows up later
        let decision = policy.observe(&full(vec![msg("m2", 2, true), msg("m1", 1, true)]));

        assert_eq!(decision, AlertDecision::NothingNew);
        assert_eq!(cue.plays(), 1);
    }

    #[test]
    fn test_suppression_covers_exactly_one_full_event() {
        let (policy, cue) = armed_policy();
        policy.observe(&full(vec![msg("m1", 1, false)]));

        policy.suppress_next();
        // Count-only events do not consume the suppression
        assert_eq!(
            policy.observe(&BusEvent::count_only(3)),
            AlertDecision::CountOnly
        );
        assert_eq!(policy.state().suppression, Suppression::Suppressing);

        let decision = policy.observe(&full(vec![msg("m2", 2, true), msg("m1", 1, false)]));
        assert_eq!(decision, AlertDecision::Suppressed);
        assert_eq!(policy.state().suppression, Suppression::Idle);
        assert_eq!(cue.plays(), 1);
    }

    #[test]
    fn test_muted_does_not_advance_watermark() {
        let cue = Arc::new(SilentCue::new());
        let controller = Arc::new(CueController::new(cue.clone()));
        controller.arm();
        controller.set_enabled(false).unwrap();
        let policy = AlertPolicy::new(controller.clone());

        assert_eq!(
            policy.observe(&full(vec![msg("m1", 1, true)])),
            AlertDecision::Muted
        );
        assert_eq!(policy.watermark(), None);
        assert_eq!(cue.plays(), 0);
    }

    #[test]
    fn test_unarmed_announcement_still_advances_watermark() {
        let controller = Arc::new(CueController::new(Arc::new(SilentCue::new())));
        let policy = AlertPolicy::new(controller);

        assert_eq!(
            policy.observe(&full(vec![msg("m1", 1, true)])),
            AlertDecision::Announced(PlayOutcome::Blocked)
        );
        assert_eq!(policy.watermark(), Some(at(1)));
    }

    #[test]
    fn test_ringing_and_acknowledge() {
        let (policy, _) = armed_policy();
        assert!(!policy.is_ringing());

        policy.observe(&BusEvent::count_only(2));
        assert!(policy.is_ringing());

        policy.acknowledge();
        assert!(!policy.is_ringing());
        policy.observe(&full(vec![msg("m9", 9, true)]));
        assert!(!policy.is_ringing());
    }

    #[test]
    fn test_count_only_leaves_baselines() {
        let (policy, _) = armed_policy();
        policy.observe(&BusEvent::count_only(5));
        let state = policy.state();
        assert_eq!(state.unread, 5);
        assert_eq!(state.last_unread, 0);
        assert_eq!(state.last_total, 0);
        assert_eq!(state.watermark, None);
    }
}
