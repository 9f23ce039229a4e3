//! Slash-command dispatch and handler implementations.
//!
//! Every `/command` typed by the user is routed through [`App::handle_command`]
//! and dispatched to the matching handler below. Quests are addressed by
//! their 1-based position in the quest panel.

use anyhow::Result;

use crate::achievements::CATALOG;
use crate::api::models::RemoteId;
use crate::logging::{LogLevel, log_src};
use crate::sync::mutations::THEMES;
use crate::sync::refresh::RefreshTrigger;
use crate::sync::resolve_position;
use crate::sync::social::FriendAction;
use crate::util::{expand_path, truncate_chars};

use super::{App, Panel};

/// History lines printed by `/history`.
const HISTORY_PREVIEW: usize = 15;

// ── Command dispatch ─────────────────────────────────────────────────

impl App {
    /// Route a slash-command to the matching handler.
    pub(crate) fn handle_command(&mut self, line: &str) -> Result<()> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        match cmd {
            "/help" => self.show_help(),
            "/quit" | "/exit" => self.should_quit = true,
            "/clear" => self.core.clear_activity(),
            "/done" | "/d" => self.handle_done_command(&args),
            "/edit" | "/e" => self.handle_edit_command(&args),
            "/rm" | "/delete" => self.handle_rm_command(&args),
            "/media" => self.handle_media_command(&args),
            "/sound" => self.core.toggle_sound(),
            "/theme" => self.handle_theme_command(&args),
            "/friends" => {
                self.panel = Panel::Friends;
                self.core.load_friends();
            }
            "/friend" => self.handle_friend_command(&args),
            "/search" => self.handle_search_command(&args),
            "/feed" => {
                self.panel = Panel::Feed;
                self.core.load_feed(args.first() == Some(&"more"));
            }
            "/history" => self.show_history(),
            "/achievements" | "/ach" => self.show_achievements(),
            "/refresh" => self.core.refresh(RefreshTrigger::Manual),
            "/status" => self.show_status(),
            _ => log_src!(
                self.core.activity,
                LogLevel::Warn,
                format!("Unknown command: {cmd}")
            ),
        }

        Ok(())
    }

    fn warn(&mut self, message: String) {
        log_src!(self.core.activity, LogLevel::Warn, message);
    }

    /// Resolve a `N` or `#N` argument to a saved quest.
    fn quest_arg(&mut self, raw: Option<&&str>, usage: &str) -> Option<RemoteId> {
        let Some(position) = raw.and_then(|raw| raw.trim_start_matches('#').parse::<usize>().ok())
        else {
            self.warn(format!("Usage: {usage}"));
            return None;
        };
        match resolve_position(self.core.store(), position) {
            Ok(id) => Some(id),
            Err(message) => {
                self.warn(message);
                None
            }
        }
    }
}

// ── Help ─────────────────────────────────────────────────────────────

impl App {
    fn show_help(&mut self) {
        let lines = [
            "Quests",
            "  (plain text)            Add a quest",
            "  /done <n>               Complete quest n",
            "  /edit <n> <text>        Rename quest n (empty text deletes it)",
            "  /rm <n>                 Delete quest n",
            "  /media <n> <path>       Attach an image or video to quest n",
            "  /media <n> clear        Remove the attachment from quest n",
            "",
            "Progress",
            "  /history                Recent XP earned",
            "  /achievements           Unlocked and locked achievements",
            "",
            "Friends",
            "  /friends                Friend list and incoming requests",
            "  /friend add <user>      Send a friend request",
            "  /friend accept <user>   Accept a request",
            "  /friend decline <user>  Decline a request",
            "  /friend remove <user>   Remove a friend",
            "  /search <query>         Find users",
            "  /feed [more]            Friends' activity, or the next page",
            "",
            "Settings & session",
            "  /sound                  Toggle sound effects",
            "  /theme <dark|light>     Switch theme",
            "  /refresh                Reload everything from the server (Ctrl+R)",
            "  /status                 Connection and session details",
            "  /clear                  Clear the activity log (Ctrl+L)",
            "  /quit                   Exit (Esc)",
            "",
            "Tab cycles the left panel; Up/Down browse input history.",
        ];
        for line in lines {
            self.core.log(LogLevel::Info, line.to_string());
        }
    }
}

// ── Quest commands ───────────────────────────────────────────────────

impl App {
    fn handle_done_command(&mut self, args: &[&str]) {
        if let Some(id) = self.quest_arg(args.first(), "/done <n>") {
            self.panel = Panel::Quests;
            self.core.complete_task(&id);
        }
    }

    fn handle_edit_command(&mut self, args: &[&str]) {
        if let Some(id) = self.quest_arg(args.first(), "/edit <n> <text>") {
            let text = args.get(1..).map(|rest| rest.join(" ")).unwrap_or_default();
            self.core.edit_task(&id, &text);
        }
    }

    fn handle_rm_command(&mut self, args: &[&str]) {
        if let Some(id) = self.quest_arg(args.first(), "/rm <n>") {
            self.core.delete_task(&id);
        }
    }

    fn handle_media_command(&mut self, args: &[&str]) {
        let usage = "/media <n> <path>|clear";
        let Some(id) = self.quest_arg(args.first(), usage) else {
            return;
        };
        match args.get(1..).map(|rest| rest.join(" ")) {
            Some(target) if target == "clear" => self.core.clear_media(&id),
            Some(target) if !target.is_empty() => self.core.attach_media(&id, expand_path(&target)),
            _ => self.warn(format!("Usage: {usage}")),
        }
    }

    fn handle_theme_command(&mut self, args: &[&str]) {
        match args.first() {
            Some(theme) => self.core.set_theme(theme),
            None => {
                let current = self.core.store().settings().theme.clone();
                self.core.log(
                    LogLevel::Info,
                    format!("Theme: {current} (available: {})", THEMES.join(", ")),
                );
            }
        }
    }
}

// ── Social commands ──────────────────────────────────────────────────

impl App {
    fn handle_friend_command(&mut self, args: &[&str]) {
        let usage = "/friend add|accept|decline|remove <user>";
        let (Some(verb), Some(username)) = (args.first(), args.get(1)) else {
            self.warn(format!("Usage: {usage}"));
            return;
        };
        let social = self.core.store().social();
        let action = match *verb {
            "add" => Some(FriendAction::Request(username.to_string())),
            "accept" | "decline" => social
                .requests
                .iter()
                .find(|request| request.username.eq_ignore_ascii_case(username))
                .map(|request| {
                    if *verb == "accept" {
                        FriendAction::Accept(request.id.clone())
                    } else {
                        FriendAction::Decline(request.id.clone())
                    }
                }),
            "remove" => social
                .friends
                .iter()
                .find(|friend| friend.username.eq_ignore_ascii_case(username))
                .map(|friend| FriendAction::Remove(friend.id.clone())),
            _ => {
                self.warn(format!("Usage: {usage}"));
                return;
            }
        };
        match action {
            Some(action) => self.core.friend_action(action),
            None => self.warn(format!(
                "No {} named {username}; run /friends to refresh the list",
                if *verb == "remove" { "friend" } else { "request" }
            )),
        }
    }

    fn handle_search_command(&mut self, args: &[&str]) {
        if args.is_empty() {
            self.warn("Usage: /search <query>".to_string());
            return;
        }
        self.panel = Panel::Friends;
        self.core.search_users(&args.join(" "));
    }
}

// ── Read-only views ──────────────────────────────────────────────────

impl App {
    fn show_history(&mut self) {
        self.panel = Panel::History;
        let lines: Vec<String> = self
            .core
            .history()
            .entries()
            .take(HISTORY_PREVIEW)
            .map(|entry| {
                format!(
                    "{} {} {} +{} XP",
                    entry.when(),
                    entry.icon.as_deref().unwrap_or("•"),
                    truncate_chars(&entry.action, 48),
                    entry.points
                )
            })
            .collect();
        if lines.is_empty() {
            self.core
                .log(LogLevel::Info, "No XP earned yet.".to_string());
        }
        for line in lines {
            self.core.log(LogLevel::Info, line);
        }
    }

    fn show_achievements(&mut self) {
        let unlocked_ids = self.core.store().snapshot().achievements;
        let lines: Vec<String> = CATALOG
            .iter()
            .map(|achievement| {
                let mark = if unlocked_ids.contains(achievement.id) { "✓" } else { "·" };
                format!(
                    "{mark} {} {}: {}",
                    achievement.icon, achievement.name, achievement.description
                )
            })
            .collect();
        let unlocked = CATALOG
            .iter()
            .filter(|achievement| unlocked_ids.contains(achievement.id))
            .count();
        self.core.log(
            LogLevel::Info,
            format!("Achievements {unlocked}/{}", CATALOG.len()),
        );
        for line in lines {
            self.core.log(LogLevel::Info, line);
        }
    }

    fn show_status(&mut self) {
        let progression = *self.core.store().progression();
        let lines = [
            format!("Backend:   {}", self.core.entry_point()),
            format!("Config:    {}", self.config_source.label()),
            format!("Tab id:    {}", self.core.tab_id()),
            format!("Push:      {}", self.core.push_state().label()),
            format!("Session:   {:?}", self.core.session()),
            format!(
                "Progress:  level {} · {}/{} XP · {} done · streak {} · combo x{}",
                progression.level,
                progression.xp,
                progression.xp_max,
                progression.completed,
                progression.streak,
                progression.combo
            ),
            format!(
                "Runtime:   {} worker threads",
                self.runtime.metrics().num_workers()
            ),
        ];
        for line in lines {
            self.core.log(LogLevel::Info, line);
        }
    }
}
