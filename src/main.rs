//! Questline CLI: a terminal client for a gamified quest tracker.
//!
//! The binary sets up a full-screen terminal UI and delegates to
//! [`app::App`], which owns the sync core that keeps the local quest store
//! consistent with the backend over REST and a live push channel.

mod achievements;
mod api;
mod app;
mod config;
mod constants;
mod history;
mod logging;
mod push;
mod store;
mod sync;
#[cfg(test)]
mod test_support;
mod util;

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::ExecutableCommand;
use crossterm::event::{self, DisableFocusChange, EnableFocusChange};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::app::App;

// ── Entry point ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut app = App::new()?;
    let mut terminal = setup_terminal()?;

    let run_result = run_app(&mut terminal, &mut app);

    app.shutdown();
    restore_terminal()?;
    run_result
}

// ── Terminal lifecycle ───────────────────────────────────────────────

/// Enable raw mode, switch to the alternate screen, and create the backend.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore the terminal to its original state.
fn restore_terminal() -> Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    let mut stdout = io::stdout();
    stdout.execute(DisableFocusChange)?;
    stdout.execute(LeaveAlternateScreen)?;
    Ok(())
}

/// Main draw → poll → handle loop. Sync messages are applied once per tick.
fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|frame| app.draw(frame))?;

        if app.should_quit() {
            break;
        }

        if event::poll(Duration::from_millis(50))? {
            let ev = event::read()?;
            app.handle_event(ev)?;
        }
    }

    Ok(())
}
