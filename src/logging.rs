//! Activity log: levelled, timestamped lines shown in the activity panel.

use chrono::Local;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::constants::MAX_LOGS;

/// Severity of an activity-log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

impl LogLevel {
    fn color(self) -> Color {
        match self {
            LogLevel::Info => Color::Gray,
            LogLevel::Success => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }
}

/// One rendered entry of the activity log.
#[derive(Clone, Debug)]
pub struct LogLine {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn render(&self) -> Line<'_> {
        Line::from(vec![
            Span::styled(
                format!("{} ", self.timestamp),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(self.message.as_str(), Style::default().fg(self.level.color())),
        ])
    }
}

/// Bounded activity log; the oldest lines are dropped past [`MAX_LOGS`].
#[derive(Debug, Default)]
pub struct ActivityLog {
    lines: Vec<LogLine>,
}

impl ActivityLog {
    /// Append a message to the activity log.
    pub fn log(&mut self, level: LogLevel, message: String) {
        let timestamp = Local::now().format("%H:%M:%S").to_string();
        self.lines.push(LogLine {
            timestamp,
            level,
            message,
        });
        if self.lines.len() > MAX_LOGS {
            let overflow = self.lines.len() - MAX_LOGS;
            self.lines.drain(0..overflow);
        }
    }

    /// Append a message with a source location suffix (debug-logs builds only).
    #[cfg(feature = "debug-logs")]
    pub fn log_with_src(&mut self, level: LogLevel, message: String, src: &str) {
        let tagged = match level {
            LogLevel::Warn | LogLevel::Error => format!("{message}  [{src}]"),
            _ => message,
        };
        self.log(level, tagged);
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Number of lines at `level` containing `needle`.
    #[cfg(test)]
    pub fn count(&self, level: LogLevel, needle: &str) -> usize {
        self.lines
            .iter()
            .filter(|line| line.level == level && line.message.contains(needle))
            .count()
    }
}

/// Log a `Warn`/`Error` message, attaching `[file:line]` in debug-logs builds.
///
/// In release (no `debug-logs` feature) this behaves like `log.log()`.
///
/// ```ignore
/// log_src!(self.activity, LogLevel::Warn, format!("something broke: {err:#}"));
/// ```
macro_rules! log_src {
    ($log:expr, $level:expr, $msg:expr) => {{
        #[cfg(feature = "debug-logs")]
        {
            let loc = format!("{}:{}", file!(), line!());
            $log.log_with_src($level, $msg, &loc);
        }
        #[cfg(not(feature = "debug-logs"))]
        {
            $log.log($level, $msg);
        }
    }};
}
pub(crate) use log_src;
