//! Application shell: terminal state, lifecycle, and event dispatch.
//!
//! [`App`] owns the tokio runtime and the [`SyncCore`]; everything the user
//! sees is a projection of the core's store and activity log. Submodules:
//!
//! | Module     | Responsibility                             |
//! |------------|--------------------------------------------|
//! | `commands` | Slash-command dispatch & handlers          |
//! | `input`    | Text-input editing and input history       |
//! | `ui`       | TUI rendering & status-bar helpers         |

mod commands;
mod input;
mod ui;

use anyhow::{Context, Result};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use tokio::runtime::Runtime;

use crate::config::{ClientConfig, ConfigSource};
use crate::history::HistoryLedger;
use crate::logging::{LogLevel, log_src};
use crate::sync::SyncCore;

/// Which list the left-hand panel shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Panel {
    Quests,
    Friends,
    Feed,
    History,
}

impl Panel {
    fn next(self) -> Self {
        match self {
            Panel::Quests => Panel::Friends,
            Panel::Friends => Panel::Feed,
            Panel::Feed => Panel::History,
            Panel::History => Panel::Quests,
        }
    }

    pub(crate) fn title(self) -> &'static str {
        match self {
            Panel::Quests => " Quests ",
            Panel::Friends => " Friends ",
            Panel::Feed => " Feed ",
            Panel::History => " XP history ",
        }
    }
}

// ── Application state ────────────────────────────────────────────────

/// Top-level application state.
///
/// `core` is declared before `runtime` so its background tasks are
/// aborted before the runtime shuts down.
pub struct App {
    pub(crate) core: SyncCore,
    pub(crate) runtime: Runtime,
    pub(crate) config_source: ConfigSource,
    pub(crate) input: String,
    /// Cursor position in characters.
    pub(crate) cursor: usize,
    pub(crate) input_history: Vec<String>,
    pub(crate) history_index: Option<usize>,
    pub(crate) history_stash: String,
    pub(crate) panel: Panel,
    pub(crate) scroll_offset: u16,
    pub(crate) should_quit: bool,
}

// ── Lifecycle ────────────────────────────────────────────────────────

impl App {
    /// Create and initialise a new application instance.
    pub fn new() -> Result<Self> {
        let runtime = Runtime::new().context("create tokio runtime")?;
        let (config, config_source) = ClientConfig::load()?;
        let (history, history_error) = match HistoryLedger::open_default() {
            Ok(ledger) => (ledger, None),
            Err(err) => (HistoryLedger::in_memory(), Some(err)),
        };
        let core = SyncCore::new(&config, history, runtime.handle().clone())?;

        let mut app = App {
            core,
            runtime,
            config_source,
            input: String::new(),
            cursor: 0,
            input_history: Vec::new(),
            history_index: None,
            history_stash: String::new(),
            panel: Panel::Quests,
            scroll_offset: 0,
            should_quit: false,
        };

        app.core.log(
            LogLevel::Info,
            format!(
                "Backend {} (config: {}).",
                app.core.entry_point(),
                app.config_source.label(),
            ),
        );
        if config.session.is_none() {
            log_src!(
                app.core.activity,
                LogLevel::Warn,
                "No session cookie configured; set QUESTLINE_SESSION after signing in.".to_string()
            );
        }
        if let Some(err) = history_error {
            log_src!(
                app.core.activity,
                LogLevel::Warn,
                format!("XP history not loaded: {err:#}")
            );
        }
        app.core.log(
            LogLevel::Info,
            "Type a quest and press Enter to add it. /help lists commands.".to_string(),
        );

        app.core.start();
        Ok(app)
    }

    /// Whether the user has requested to quit.
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Apply everything the background tasks reported since the last tick.
    pub fn tick(&mut self) {
        self.core.drain();
        if let Some(entry) = self.core.take_expired_redirect() {
            if let Err(err) = open::that(&entry) {
                log_src!(
                    self.core.activity,
                    LogLevel::Warn,
                    format!("Could not open {entry}: {err}")
                );
            }
        }
    }

    /// Stop background work before the terminal is restored.
    pub fn shutdown(&mut self) {
        self.core.shutdown();
    }
}

// ── Event handling ───────────────────────────────────────────────────

impl App {
    /// Route a terminal event to the appropriate handler.
    pub fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Key(key) => self.handle_key(key)?,
            Event::FocusGained => {
                self.core.on_visibility(true);
                self.core.on_focus();
            }
            Event::FocusLost => self.core.on_visibility(false),
            _ => {}
        }
        Ok(())
    }

    /// Dispatch a key press to input editing, commands, or control actions.
    fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        match key {
            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => self.should_quit = true,

            KeyEvent {
                code: KeyCode::Char('l'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => self.core.clear_activity(),

            KeyEvent {
                code: KeyCode::Char('r'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => self.core.refresh(crate::sync::refresh::RefreshTrigger::Manual),

            KeyEvent { code, .. } => match code {
                KeyCode::Char(ch) => {
                    self.scroll_offset = 0;
                    self.insert_char(ch);
                }
                KeyCode::Backspace => self.backspace(),
                KeyCode::Delete => self.delete(),
                KeyCode::Left => self.move_cursor_left(),
                KeyCode::Right => self.move_cursor_right(),
                KeyCode::Home => self.move_cursor_home(),
                KeyCode::End => self.move_cursor_end(),
                KeyCode::Up => self.history_prev(),
                KeyCode::Down => self.history_next(),
                KeyCode::PageUp => self.scroll_up(10),
                KeyCode::PageDown => self.scroll_down(10),
                KeyCode::Tab => self.panel = self.panel.next(),
                KeyCode::Enter => {
                    self.scroll_offset = 0;
                    self.submit_input()?;
                }
                KeyCode::Esc => self.should_quit = true,
                _ => {}
            },
        }
        Ok(())
    }

    /// Submit the current input line for processing.
    fn submit_input(&mut self) -> Result<()> {
        let line = self.input.trim().to_string();
        self.input.clear();
        self.cursor = 0;
        self.history_index = None;

        if line.is_empty() {
            return Ok(());
        }
        if self.input_history.last() != Some(&line) {
            self.input_history.push(line.clone());
        }

        if line.starts_with('/') {
            self.handle_command(&line)?;
        } else {
            self.core.create_task(&line);
        }

        Ok(())
    }
}

// ── Scrolling ────────────────────────────────────────────────────────

impl App {
    /// Scroll the activity log up by `n` lines.
    pub(crate) fn scroll_up(&mut self, n: u16) {
        self.scroll_offset = self.scroll_offset.saturating_add(n);
    }

    /// Scroll the activity log down by `n` lines (towards the latest).
    pub(crate) fn scroll_down(&mut self, n: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }
}
