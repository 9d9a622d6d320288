//! TUI rendering

use super::app::App;
use crate::presenter::{badge, inbox};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};

pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Badge header
            Constraint::Min(0),    // Inbox
        ])
        .split(f.area());

    badge::draw(f, &app.badge, &app.account, chunks[0]);
    inbox::draw(f, &mut app.inbox, chunks[1]);
}
