//! Terminal UI rendering: status bar, list panel, activity log, and prompt.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::push::PushState;
use crate::store::{Task, TaskPhase};
use crate::sync::Session;
use crate::util::truncate_chars;

use super::{App, Panel};

impl App {
    /// Render the full TUI frame.
    pub fn draw(&mut self, frame: &mut Frame<'_>) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(frame.area());

        self.draw_status(frame, rows[0]);
        self.draw_xp_bar(frame, rows[1]);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(rows[2]);
        self.draw_panel(frame, columns[0]);
        self.draw_activity(frame, columns[1]);
        self.draw_prompt(frame, rows[3]);
    }

    fn accent(&self) -> Color {
        if self.core.store().snapshot().settings.theme == "light" {
            Color::Blue
        } else {
            Color::Magenta
        }
    }

    // ── Status bar ───────────────────────────────────────────────────

    fn draw_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let view = self.core.store().snapshot();
        let progression = view.progression;
        let dim = Style::default().fg(Color::DarkGray);
        let mut spans = vec![
            Span::styled("Level ", dim),
            Span::styled(
                progression.level.to_string(),
                Style::default().fg(self.accent()).add_modifier(Modifier::BOLD),
            ),
            Span::styled("  Done ", dim),
            Span::raw(progression.completed.to_string()),
            Span::styled("  Streak ", dim),
            Span::raw(format!("{}d", progression.streak)),
        ];
        if progression.combo > 1 {
            spans.push(Span::styled(
                format!("  🔥x{}", progression.combo),
                Style::default().fg(Color::Yellow),
            ));
        }
        spans.push(Span::styled("  Live: ", dim));
        spans.push(Span::styled(
            self.core.push_state().label(),
            Style::default().fg(push_color(self.core.push_state())),
        ));
        if view.settings.sound {
            spans.push(Span::styled("  ♪", dim));
        }
        if self.core.session() == Session::Expired {
            spans.push(Span::styled(
                "  SESSION EXPIRED",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_xp_bar(&self, frame: &mut Frame<'_>, area: Rect) {
        let progression = self.core.store().snapshot().progression;
        let ratio = if progression.xp_max == 0 {
            0.0
        } else {
            (progression.xp as f64 / progression.xp_max as f64).clamp(0.0, 1.0)
        };
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(self.accent()))
            .ratio(ratio)
            .label(format!("{}/{} XP", progression.xp, progression.xp_max));
        frame.render_widget(gauge, area);
    }

    // ── Left panel ───────────────────────────────────────────────────

    fn draw_panel(&self, frame: &mut Frame<'_>, area: Rect) {
        let width = area.width.saturating_sub(8) as usize;
        let lines = match self.panel {
            Panel::Quests => self.quest_lines(width),
            Panel::Friends => self.friend_lines(width),
            Panel::Feed => self.feed_lines(width),
            Panel::History => self.history_lines(width),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.panel.title())
            .border_style(Style::default().fg(self.accent()));
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn quest_lines(&self, width: usize) -> Vec<Line<'static>> {
        let view = self.core.store().snapshot();
        if !view.loaded {
            return vec![placeholder("Loading…")];
        }
        if view.tasks.is_empty() {
            return vec![placeholder("No quests. Type one below to begin.")];
        }
        view.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| quest_line(index + 1, task, width))
            .collect()
    }

    fn friend_lines(&self, width: usize) -> Vec<Line<'static>> {
        let social = self.core.store().social();
        let mut lines = Vec::new();
        for request in &social.requests {
            lines.push(Line::from(vec![
                Span::styled("? ", Style::default().fg(Color::Yellow)),
                Span::raw(truncate_chars(&request.username, width)),
                Span::styled(" wants to be friends", Style::default().fg(Color::DarkGray)),
            ]));
        }
        for friend in &social.friends {
            lines.push(Line::from(vec![
                Span::raw(truncate_chars(&friend.username, width)),
                Span::styled(
                    friend
                        .level
                        .map(|level| format!("  lvl {level}"))
                        .unwrap_or_default(),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
        }
        if let Some(query) = &social.search_query {
            lines.push(Line::raw(""));
            lines.push(placeholder(&format!("Search: {query}")));
            for user in &social.search_results {
                lines.push(Line::raw(format!("  {}", truncate_chars(&user.username, width))));
            }
        }
        if lines.is_empty() {
            lines.push(placeholder("No friends loaded. Try /friends"));
        }
        lines
    }

    fn feed_lines(&self, width: usize) -> Vec<Line<'static>> {
        let social = self.core.store().social();
        let mut lines: Vec<Line<'static>> = social
            .feed
            .iter()
            .map(|item| {
                let xp = item.xp.map(|xp| format!(" +{xp}")).unwrap_or_default();
                Line::from(vec![
                    Span::styled(
                        format!("{} ", item.username),
                        Style::default().fg(self.accent()),
                    ),
                    Span::raw(truncate_chars(&item.text, width)),
                    Span::styled(xp, Style::default().fg(Color::Green)),
                ])
            })
            .collect();
        if social.feed_has_more {
            lines.push(placeholder("/feed more for older entries"));
        }
        if lines.is_empty() {
            lines.push(placeholder("Feed is empty. Try /feed"));
        }
        lines
    }

    fn history_lines(&self, width: usize) -> Vec<Line<'static>> {
        let lines: Vec<Line<'static>> = self
            .core
            .history()
            .entries()
            .map(|entry| {
                Line::from(vec![
                    Span::styled(
                        format!("{} ", entry.when()),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::raw(truncate_chars(&entry.action, width.saturating_sub(20))),
                    Span::styled(format!(" +{}", entry.points), Style::default().fg(Color::Green)),
                ])
            })
            .collect();
        if lines.is_empty() {
            return vec![placeholder("No XP earned yet.")];
        }
        lines
    }

    // ── Activity log ─────────────────────────────────────────────────

    fn draw_activity(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let inner_width = area.width.saturating_sub(2);
        let inner_height = area.height.saturating_sub(2) as usize;

        let log_lines: Vec<Line> = self
            .core
            .activity()
            .lines()
            .iter()
            .map(|line| line.render())
            .collect();
        let log_paragraph = Paragraph::new(Text::from(log_lines)).wrap(Wrap { trim: true });

        let total_visual = log_paragraph.line_count(inner_width);
        let max_scroll = total_visual.saturating_sub(inner_height);

        // scroll_offset counts lines up from the bottom.
        if (self.scroll_offset as usize) > max_scroll {
            self.scroll_offset = max_scroll as u16;
        }
        let top_row = max_scroll.saturating_sub(self.scroll_offset as usize) as u16;

        let title = if self.scroll_offset > 0 {
            format!(" Activity [↑{}] ", self.scroll_offset)
        } else {
            " Activity ".to_string()
        };
        let panel = log_paragraph
            .block(Block::default().borders(Borders::ALL).title(title))
            .scroll((top_row, 0));
        frame.render_widget(panel, area);
    }

    // ── Input prompt ─────────────────────────────────────────────────

    fn draw_prompt(&self, frame: &mut Frame<'_>, area: Rect) {
        let title = if self.input.starts_with('/') {
            "Command"
        } else {
            "New quest"
        };
        let prompt = Paragraph::new(self.input.as_str())
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(prompt, area);

        let input_width = area.width.saturating_sub(2) as usize;
        let cursor = self.cursor.min(input_width);
        frame.set_cursor_position(Position::new(area.x + 1 + cursor as u16, area.y + 1));
    }
}

fn push_color(state: PushState) -> Color {
    match state {
        PushState::Connected => Color::Green,
        PushState::Connecting | PushState::Reconnecting { .. } => Color::Yellow,
        PushState::Disconnected => Color::DarkGray,
    }
}

fn placeholder(text: &str) -> Line<'static> {
    Line::styled(text.to_string(), Style::default().fg(Color::DarkGray))
}

fn quest_line(position: usize, task: &Task, width: usize) -> Line<'static> {
    let (style, suffix) = match task.phase {
        TaskPhase::Active => (Style::default(), String::new()),
        TaskPhase::Pending => (Style::default().fg(Color::DarkGray), " (saving…)".to_string()),
        TaskPhase::Unsynced => (Style::default().fg(Color::Red), " (not saved)".to_string()),
        TaskPhase::Leaving => (
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::CROSSED_OUT),
            String::new(),
        ),
    };
    let mut spans = vec![
        Span::styled(format!("{position:>2}. "), Style::default().fg(Color::DarkGray)),
        Span::styled(truncate_chars(&task.text, width), style),
    ];
    if task.xp > 0 {
        spans.push(Span::styled(
            format!(" +{}", task.xp),
            Style::default().fg(Color::Green),
        ));
    }
    if let Some(media) = &task.media {
        spans.push(Span::styled(
            format!(" [{:?}]", media.kind).to_lowercase(),
            Style::default().fg(Color::Cyan),
        ));
    }
    if !suffix.is_empty() {
        spans.push(Span::styled(suffix, Style::default().fg(Color::DarkGray)));
    }
    Line::from(spans)
}
