//! Terminal User Interface for one client session
//!
//! Badge header above the inbox list. Bus events, terminal input and focus
//! changes are multiplexed on one task.

mod app;
mod ui;

pub use app::App;

use crate::sync::ClientSession;
use crate::Result;
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange, Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;

/// Redraw period when nothing else happens (ringing indicator, selection)
const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

/// Run the TUI until the user quits
pub async fn run(session: &ClientSession, mut app: App, refresh_on_focus: bool) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, session, &mut app, refresh_on_focus).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    res
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    session: &ClientSession,
    app: &mut App,
    refresh_on_focus: bool,
) -> Result<()> {
    let (_subscription, mut events) = session.subscribe_channel();
    let mut input = EventStream::new();
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        tokio::select! {
            Some(event) = events.recv() => {
                app.apply(&event, session);
            }
            maybe = input.next() => {
                match maybe {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        app.handle_key(key, session).await;
                    }
                    Some(Ok(Event::FocusGained)) if refresh_on_focus => {
                        tracing::debug!("Terminal regained focus");
                        session.focus_regained();
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                }
            }
            _ = redraw.tick() => {
                app.badge.sync_alert(session.alert());
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
