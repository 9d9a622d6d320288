//! TUI application state

use crate::presenter::{BadgePresenter, InboxPresenter};
use crate::sync::{BusEvent, ClientSession};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub struct App {
    pub account: String,
    pub badge: BadgePresenter,
    pub inbox: InboxPresenter,
    pub should_quit: bool,
}

impl App {
    pub fn new(account: impl Into<String>, badge_cap: usize, preview_chars: usize) -> Self {
        Self {
            account: account.into(),
            badge: BadgePresenter::new().with_cap(badge_cap),
            inbox: InboxPresenter::new().with_preview_chars(preview_chars),
            should_quit: false,
        }
    }

    /// Feed one bus event to both presenters
    pub fn apply(&mut self, event: &BusEvent, session: &ClientSession) {
        self.badge.apply(event);
        self.inbox.apply(event);
        self.badge.sync_alert(session.alert());
    }

    /// Handle a key press
    pub async fn handle_key(&mut self, key: KeyEvent, session: &ClientSession) {
        // Any key is a user gesture
        session.alert().cue().arm();

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true
            }
            KeyCode::Char('j') | KeyCode::Down => self.inbox.next(),
            KeyCode::Char('k') | KeyCode::Up => self.inbox.previous(),
            KeyCode::Enter => self.inbox.toggle_expanded(),
            KeyCode::Esc => self.inbox.dismiss_notice(),
            KeyCode::Char('o') => session.alert().acknowledge(),
            KeyCode::Char('r') => {
                let _ = self.inbox.mark_selected_read(session.mutator()).await;
            }
            KeyCode::Char('R') => {
                let _ = self.inbox.mark_all_read(session.mutator()).await;
            }
            KeyCode::Char('g') => session.poll().reconcile_now(false),
            _ => {}
        }

        self.badge.sync_alert(session.alert());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::{AccountId, MemoryStore, Message, MessageKind};
    use std::sync::Arc;
    use std::time::Duration;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn mounted() -> (Arc<MemoryStore>, ClientSession) {
        let account = AccountId::new("acct-1");
        let store = Arc::new(MemoryStore::new());
        store.set_messages(
            &account,
            vec![
                Message::new(MessageKind::Admin, "second").with_id("m2"),
                Message::new(MessageKind::Admin, "first").with_id("m1"),
            ],
        );
        let session = ClientSession::builder(account, store.clone())
            .with_poll_interval(Duration::from_secs(3600))
            .mount();
        session.reconcile_now(false).await;
        (store, session)
    }

    #[tokio::test]
    async fn test_keys_drive_presenters() {
        let (store, session) = mounted().await;
        let mut app = App::new("acct-1", 99, 80);
        let (_sub, mut rx) = session.subscribe_channel();
        app.apply(&rx.recv().await.unwrap(), &session);

        assert_eq!(app.badge.unread(), 2);
        assert!(app.badge.is_ringing());
        assert!(!session.alert().cue().is_armed());

        app.handle_key(key(KeyCode::Char('o')), &session).await;
        assert!(session.alert().cue().is_armed());
        assert!(!app.badge.is_ringing());

        app.handle_key(key(KeyCode::Char('j')), &session).await;
        app.handle_key(key(KeyCode::Char('r')), &session).await;
        assert!(!store.messages(session.account()).unwrap()[1].unread);
        assert_eq!(app.inbox.unread_count(), 1);

        app.handle_key(key(KeyCode::Char('q')), &session).await;
        assert!(app.should_quit);
        session.teardown().await;
    }
}
