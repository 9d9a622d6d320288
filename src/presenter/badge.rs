//! Compact unread badge

use crate::sync::{AlertPolicy, BusEvent};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

/// Default display cap; larger counts render as `99+`
pub const DEFAULT_BADGE_CAP: usize = 99;

/// Unread badge state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgePresenter {
    unread: usize,
    ringing: bool,
    cap: usize,
}

impl Default for BadgePresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl BadgePresenter {
    pub fn new() -> Self {
        Self {
            unread: 0,
            ringing: false,
            cap: DEFAULT_BADGE_CAP,
        }
    }

    /// Display cap (at least 1)
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = cap.max(1);
        self
    }

    /// Take the count from any event, full or count-only
    pub fn apply(&mut self, event: &BusEvent) {
        self.unread = event.unread_count;
    }

    /// Mirror the visual alert state
    pub fn sync_alert(&mut self, alert: &AlertPolicy) {
        self.ringing = alert.is_ringing();
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn is_ringing(&self) -> bool {
        self.ringing
    }

    pub fn is_visible(&self) -> bool {
        self.unread > 0
    }

    /// Count as shown to the user; the underlying number is never altered
    pub fn label(&self) -> String {
        if self.unread > self.cap {
            format!("{}+", self.cap)
        } else {
            self.unread.to_string()
        }
    }
}

/// Draw the badge as a one-line header
pub fn draw(f: &mut Frame, badge: &BadgePresenter, account: &str, area: Rect) {
    let mut spans = vec![Span::styled(
        format!("Inbox: {}  ", account),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];

    if badge.is_visible() {
        let style = if badge.is_ringing() {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::SLOW_BLINK)
        } else {
            Style::default().fg(Color::Yellow)
        };
        spans.push(Span::styled(format!(" {} unread ", badge.label()), style));
    } else {
        spans.push(Span::styled(
            "no unread messages",
            Style::default().fg(Color::DarkGray),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}
