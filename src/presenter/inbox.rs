//! Full inbox list
//!
//! Shows every message with its kind, time and sender. Long bodies are
//! previewed and can be expanded one item at a time. Read-state changes are
//! only reflected after the store confirmed the write; a failed write shows a
//! notice and re-reconciles instead of guessing.

use crate::inbox::{Message, MessageId};
use crate::sync::{BusEvent, MarkReadOutcome, MutationError, ReadStateMutator};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use std::borrow::Cow;
use std::collections::HashSet;

/// Default preview length, in characters
pub const DEFAULT_PREVIEW_CHARS: usize = 80;

/// Inbox list state
#[derive(Debug)]
pub struct InboxPresenter {
    messages: Vec<Message>,
    unread: usize,
    list_state: ListState,
    expanded: HashSet<MessageId>,
    preview_chars: usize,
    notice: Option<String>,
}

impl Default for InboxPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl InboxPresenter {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            unread: 0,
            list_state: ListState::default(),
            expanded: HashSet::new(),
            preview_chars: DEFAULT_PREVIEW_CHARS,
            notice: None,
        }
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars.max(1);
        self
    }

    /// Apply a bus event
    ///
    /// A count-only event updates the count and keeps the last full list.
    pub fn apply(&mut self, event: &BusEvent) {
        self.unread = event.unread_count;
        if let Some(messages) = &event.messages {
            self.messages = messages.clone();
            self.expanded
                .retain(|id| self.messages.iter().any(|m| &m.id == id));
            self.clamp_selection();
        }
    }

    fn clamp_selection(&mut self) {
        if self.messages.is_empty() {
            self.list_state.select(None);
        } else {
            let current = self.list_state.selected().unwrap_or(0);
            self.list_state
                .select(Some(current.min(self.messages.len() - 1)));
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn selected(&self) -> Option<&Message> {
        self.list_state
            .selected()
            .and_then(|i| self.messages.get(i))
    }

    /// Move selection down (wraps)
    pub fn next(&mut self) {
        if self.messages.is_empty() {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0);
        let next = if current + 1 >= self.messages.len() {
            0
        } else {
            current + 1
        };
        self.list_state.select(Some(next));
    }

    /// Move selection up (wraps)
    pub fn previous(&mut self) {
        if self.messages.is_empty() {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0);
        let prev = if current == 0 {
            self.messages.len() - 1
        } else {
            current - 1
        };
        self.list_state.select(Some(prev));
    }

    /// Expand or collapse the selected message
    pub fn toggle_expanded(&mut self) {
        let Some(id) = self.selected().map(|m| m.id.clone()) else {
            return;
        };
        if !self.expanded.remove(&id) {
            self.expanded.insert(id);
        }
    }

    pub fn is_expanded(&self, id: &MessageId) -> bool {
        self.expanded.contains(id)
    }

    /// Body as shown in the list: full when expanded, else a preview
    pub fn body<'a>(&self, message: &'a Message) -> Cow<'a, str> {
        if self.is_expanded(&message.id) {
            Cow::Borrowed(&message.text)
        } else {
            preview(&message.text, self.preview_chars)
        }
    }

    /// Mark the selected message read
    pub async fn mark_selected_read(
        &mut self,
        mutator: &ReadStateMutator,
    ) -> Result<MarkReadOutcome, MutationError> {
        let Some(id) = self.selected().map(|m| m.id.clone()) else {
            return Ok(MarkReadOutcome::Unchanged);
        };
        let result = mutator.mark_one_read(&id).await;
        self.settle(mutator, result, |m| m.id == id).await
    }

    /// Mark every message read
    pub async fn mark_all_read(
        &mut self,
        mutator: &ReadStateMutator,
    ) -> Result<MarkReadOutcome, MutationError> {
        let result = mutator.mark_all_read().await;
        self.settle(mutator, result, |_| true).await
    }

    async fn settle<F>(
        &mut self,
        mutator: &ReadStateMutator,
        result: Result<MarkReadOutcome, MutationError>,
        affected: F,
    ) -> Result<MarkReadOutcome, MutationError>
    where
        F: Fn(&Message) -> bool,
    {
        match &result {
            Ok(_) => {
                self.notice = None;
                let mut flipped = 0;
                for message in self.messages.iter_mut().filter(|m| m.unread && affected(m)) {
                    message.unread = false;
                    flipped += 1;
                }
                self.unread = self.unread.saturating_sub(flipped);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Mark read failed; reconciling");
                self.notice = Some("Could not update read state. Please try again.".to_string());
                mutator.reconciler().reconcile(false).await;
            }
        }
        result
    }
}

/// Truncate `text` to at most `max_chars` characters, on a char boundary
pub fn preview(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}

/// Draw the inbox list
pub fn draw(f: &mut Frame, inbox: &mut InboxPresenter, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Messages
            Constraint::Length(3), // Notice / help
        ])
        .split(area);

    let items: Vec<ListItem> = inbox
        .messages
        .iter()
        .map(|msg| create_message_list_item(inbox, msg))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(
                    "Messages ({}, {} unread)",
                    inbox.messages.len(),
                    inbox.unread
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );
    f.render_stateful_widget(list, chunks[0], &mut inbox.list_state);

    let footer = match &inbox.notice {
        Some(notice) => Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        None => Line::from(vec![
            Span::raw("j/k (navigate)  "),
            Span::styled("Enter: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("Expand  "),
            Span::styled("r/R: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("Read/All  "),
            Span::styled("o: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("Acknowledge  "),
            Span::styled("q: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("Quit"),
        ]),
    };
    let footer = Paragraph::new(footer).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, chunks[1]);
}

fn create_message_list_item(inbox: &InboxPresenter, msg: &Message) -> ListItem<'static> {
    let kind_color = match msg.kind {
        crate::inbox::MessageKind::Admin => Color::Green,
        crate::inbox::MessageKind::Rejection => Color::Red,
        crate::inbox::MessageKind::System => Color::Blue,
    };

    let mut header = vec![
        Span::styled(
            if msg.unread { "* " } else { "  " },
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(
            format!("[{}] ", msg.kind.label()),
            Style::default().fg(kind_color),
        ),
        Span::styled(
            format!("{} ", msg.created_at.format("%Y-%m-%d %H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(sender) = &msg.sender {
        header.push(Span::styled(
            format!("{}: ", sender),
            Style::default().fg(Color::Cyan),
        ));
    }

    let style = if msg.unread {
        Style::default().add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    if inbox.is_expanded(&msg.id) {
        let mut lines = vec![Line::from(header)];
        lines.extend(
            msg.text
                .lines()
                .map(|l| Line::from(Span::styled(format!("    {}", l), style))),
        );
        ListItem::new(lines)
    } else {
        header.push(Span::styled(inbox.body(msg).into_owned(), style));
        ListItem::new(Line::from(header))
    }
}
