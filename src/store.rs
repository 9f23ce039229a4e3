//! Quest store: the single mutable source of truth for tasks, progression,
//! achievements, settings and social projections.
//!
//! Every mutation goes through a named reconciliation operation. The rules
//! that keep concurrent sources (optimistic local changes, REST replies,
//! push events, full reloads) consistent:
//!
//! - the task list never holds two entries with the same server id;
//! - progression is only ever overwritten from an authoritative payload;
//! - achievements are monotonic and each unlock is announced once;
//! - ids whose removal is in flight, or recently succeeded, are not
//!   resurrected by stale payloads;
//! - a quest confirmed since the last reload survives one reload that was
//!   fetched before it existed.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;

use crate::api::models::{
    CompletionResult, FeedItem, FeedPage, Friend, FriendRequest, FriendsList, Media, Progression,
    RemoteId, StateSnapshot, TaskPatch, TaskRecord, UserSummary,
};

/// Completion ids remembered for one-shot notices, and removed ids
/// remembered against stale reloads.
const RECENT_CAP: usize = 256;

/// Store-side identity of a quest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TaskId {
    /// Optimistic insert still waiting for its server id.
    Local(u64),
    Remote(RemoteId),
}

impl TaskId {
    pub fn remote(&self) -> Option<&RemoteId> {
        match self {
            TaskId::Remote(id) => Some(id),
            TaskId::Local(_) => None,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Local(n) => write!(f, "~{n}"),
            TaskId::Remote(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskPhase {
    /// Created locally, server id not known yet.
    Pending,
    Active,
    /// Create call failed; shown until the next full reload replaces it.
    Unsynced,
    /// Completed or deleted; shown until its leave delay elapses.
    Leaving,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub xp: u32,
    pub media: Option<Media>,
    pub phase: TaskPhase,
}

impl Task {
    fn from_record(record: TaskRecord) -> Self {
        Task {
            id: TaskId::Remote(record.id),
            text: record.text,
            xp: record.xp,
            media: record.media,
            phase: TaskPhase::Active,
        }
    }

    fn has_remote(&self, id: &RemoteId) -> bool {
        self.id.remote() == Some(id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub sound: bool,
    pub theme: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sound: false,
            theme: "dark".to_string(),
        }
    }
}

/// One-shot events for whoever presents popups, sounds, and the like.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    QuestAdded { text: String, xp: u32 },
    LevelUp { level: u32 },
    AchievementUnlocked { id: String },
    ComboUp { combo: u32 },
}

/// Friend list, incoming requests, feed pagination, and search results.
#[derive(Clone, Debug, Default)]
pub struct SocialState {
    pub friends: Vec<Friend>,
    pub requests: Vec<FriendRequest>,
    pub feed: Vec<FeedItem>,
    pub feed_next_offset: usize,
    pub feed_has_more: bool,
    pub search_query: Option<String>,
    pub search_results: Vec<UserSummary>,
}

/// Borrowed read view of the store.
#[derive(Clone, Copy, Debug)]
pub struct StoreSnapshot<'a> {
    pub tasks: &'a [Task],
    pub progression: &'a Progression,
    pub achievements: &'a BTreeSet<String>,
    pub settings: &'a Settings,
    pub loaded: bool,
}

#[derive(Debug, Default)]
pub struct QuestStore {
    tasks: Vec<Task>,
    progression: Progression,
    achievements: BTreeSet<String>,
    settings: Settings,
    social: SocialState,
    removing: HashSet<RemoteId>,
    removed: VecDeque<RemoteId>,
    confirmed: HashSet<RemoteId>,
    celebrated: VecDeque<RemoteId>,
    notices: Vec<Notice>,
    next_local: u64,
    loaded: bool,
}

// ── Reads ────────────────────────────────────────────────────────────

impl QuestStore {
    pub fn snapshot(&self) -> StoreSnapshot<'_> {
        StoreSnapshot {
            tasks: &self.tasks,
            progression: &self.progression,
            achievements: &self.achievements,
            settings: &self.settings,
            loaded: self.loaded,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn progression(&self) -> &Progression {
        &self.progression
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn social(&self) -> &SocialState {
        &self.social
    }

    #[cfg(test)]
    pub fn is_unlocked(&self, achievement: &str) -> bool {
        self.achievements.contains(achievement)
    }

    pub fn find(&self, id: &RemoteId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.has_remote(id))
    }

    /// Quest at a 1-based list position.
    pub fn task_at(&self, position: usize) -> Option<&Task> {
        position.checked_sub(1).and_then(|index| self.tasks.get(index))
    }

    pub fn is_removing(&self, id: &RemoteId) -> bool {
        self.removing.contains(id)
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Removal in flight or recently confirmed by the server.
    fn is_shielded(&self, id: &RemoteId) -> bool {
        self.removing.contains(id) || self.removed.contains(id)
    }
}

// ── Full reload ──────────────────────────────────────────────────────

impl QuestStore {
    /// Replace everything from a server snapshot.
    ///
    /// Pending optimistic inserts stay at the head until their create call
    /// answers. Removed ids are skipped. Quests confirmed since the previous
    /// reload are kept even when this snapshot predates them, once.
    /// Achievements are unioned without notices.
    pub fn merge_full_state(&mut self, snapshot: StateSnapshot) {
        let listed: HashSet<RemoteId> = snapshot
            .tasks
            .iter()
            .map(|record| record.id.clone())
            .collect();
        let confirmed = std::mem::take(&mut self.confirmed);
        let kept: Vec<Task> = self
            .tasks
            .drain(..)
            .filter(|task| match task.id.remote() {
                None => task.phase == TaskPhase::Pending,
                Some(id) => {
                    task.phase == TaskPhase::Active
                        && confirmed.contains(id)
                        && !listed.contains(id)
                }
            })
            .collect();

        let mut seen = HashSet::new();
        let incoming: Vec<Task> = snapshot
            .tasks
            .into_iter()
            .filter(|record| !self.is_shielded(&record.id))
            .filter(|record| seen.insert(record.id.clone()))
            .map(Task::from_record)
            .collect();

        self.tasks = kept.into_iter().chain(incoming).collect();
        self.progression = snapshot.progression;
        self.achievements.extend(
            snapshot
                .achievements
                .into_iter()
                .filter_map(|(id, unlocked)| unlocked.then_some(id)),
        );
        self.settings.sound = snapshot.sound;
        if let Some(theme) = snapshot.theme {
            self.settings.theme = theme;
        }
        self.loaded = true;
    }
}

// ── Tasks ────────────────────────────────────────────────────────────

impl QuestStore {
    /// Prepend an optimistic quest and return its local id.
    pub fn insert_provisional(&mut self, text: &str) -> u64 {
        self.next_local += 1;
        let local = self.next_local;
        self.tasks.insert(
            0,
            Task {
                id: TaskId::Local(local),
                text: text.to_string(),
                xp: 0,
                media: None,
                phase: TaskPhase::Pending,
            },
        );
        local
    }

    /// Swap a provisional quest for its server record.
    ///
    /// If the record already arrived by another path (push echo, reload),
    /// the provisional entry is simply dropped.
    pub fn confirm_task(&mut self, local: u64, record: TaskRecord) -> bool {
        let slot = self
            .tasks
            .iter()
            .position(|task| task.id == TaskId::Local(local));
        let known = self.find(&record.id).is_some() || self.is_shielded(&record.id);
        let text = record.text.clone();
        let xp = record.xp;

        let inserted = match (slot, known) {
            (Some(index), true) => {
                self.tasks.remove(index);
                false
            }
            (Some(index), false) => {
                self.confirmed.insert(record.id.clone());
                self.tasks[index] = Task::from_record(record);
                true
            }
            (None, _) => {
                let id = record.id.clone();
                let inserted = self.upsert_task(record);
                if inserted {
                    self.confirmed.insert(id);
                }
                inserted
            }
        };
        if inserted {
            self.notices.push(Notice::QuestAdded { text, xp });
        }
        inserted
    }

    /// Insert a quest unless one with the same id exists, in which case its
    /// mutable fields are refreshed in place. Returns whether it was inserted.
    pub fn upsert_task(&mut self, record: TaskRecord) -> bool {
        if self.is_shielded(&record.id) {
            return false;
        }
        if let Some(task) = self.tasks.iter_mut().find(|task| task.has_remote(&record.id)) {
            task.text = record.text;
            task.media = record.media;
            return false;
        }
        self.tasks.insert(0, Task::from_record(record));
        true
    }

    /// Drop a quest outright. Absent ids are a no-op.
    pub fn remove_task_by_id(&mut self, id: &RemoteId) -> Option<Task> {
        let index = self.tasks.iter().position(|task| task.has_remote(id))?;
        self.confirmed.remove(id);
        Some(self.tasks.remove(index))
    }

    /// The create call for a provisional quest failed. It stays visible
    /// but is no longer shielded from full reloads.
    pub fn mark_unsynced(&mut self, local: u64) {
        if let Some(task) = self
            .tasks
            .iter_mut()
            .find(|task| task.id == TaskId::Local(local))
        {
            task.phase = TaskPhase::Unsynced;
        }
    }

    /// Mark a quest as leaving and shield its id from stale payloads until
    /// the server has answered.
    pub fn begin_removal(&mut self, id: &RemoteId) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|task| task.has_remote(id)) else {
            return false;
        };
        if task.phase == TaskPhase::Leaving {
            return false;
        }
        task.phase = TaskPhase::Leaving;
        self.removing.insert(id.clone());
        true
    }

    /// The server answered the removal. A confirmed removal keeps the id
    /// shielded from reloads fetched before it; a failed one releases it so
    /// the next reload restores the quest.
    pub fn release_removal(&mut self, id: &RemoteId, removed: bool) {
        self.removing.remove(id);
        if removed && !self.removed.contains(id) {
            self.removed.push_back(id.clone());
            if self.removed.len() > RECENT_CAP {
                self.removed.pop_front();
            }
        }
    }

    pub fn set_task_text(&mut self, id: &RemoteId, text: &str) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|task| task.has_remote(id)) else {
            return false;
        };
        if task.text == text {
            return false;
        }
        task.text = text.to_string();
        true
    }

    pub fn set_task_media(&mut self, id: &RemoteId, media: Option<Media>) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|task| task.has_remote(id)) else {
            return false;
        };
        task.media = media;
        true
    }

    /// Apply a `task_updated` payload to an existing quest. Never inserts.
    pub fn apply_patch(&mut self, patch: TaskPatch, keep_local_text: bool) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|task| task.has_remote(&patch.id)) else {
            return false;
        };
        let mut changed = false;
        if let Some(text) = patch.text.filter(|_| !keep_local_text) {
            if task.text != text {
                task.text = text;
                changed = true;
            }
        }
        if let Some(media) = patch.media {
            if task.media != media {
                task.media = media;
                changed = true;
            }
        }
        changed
    }
}

// ── Progression & achievements ───────────────────────────────────────

impl QuestStore {
    /// Overwrite every progression field the payload carries.
    pub fn apply_progression(&mut self, delta: &CompletionResult) {
        let p = &mut self.progression;
        let fields = [
            (&mut p.level, delta.level),
            (&mut p.xp, delta.xp),
            (&mut p.xp_max, delta.xp_max),
            (&mut p.completed, delta.completed),
            (&mut p.streak, delta.streak),
            (&mut p.combo, delta.combo),
        ];
        for (slot, value) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }

    /// Reconcile a completion result for quest `id`.
    ///
    /// Scalars are always overwritten (last reconciled wins). Level-up and
    /// combo notices fire only the first time a given completion is seen, so
    /// the REST reply and its push echo announce once between them.
    pub fn apply_completion(&mut self, id: &RemoteId, result: &CompletionResult) {
        let combo_before = self.progression.combo;
        self.apply_progression(result);
        self.unlock_achievements(&result.new_achievements);

        if self.celebrated.contains(id) {
            return;
        }
        self.celebrated.push_back(id.clone());
        if self.celebrated.len() > RECENT_CAP {
            self.celebrated.pop_front();
        }
        if result.leveled_up {
            self.notices.push(Notice::LevelUp {
                level: self.progression.level,
            });
        }
        let combo = self.progression.combo;
        if combo > 1 && combo > combo_before {
            self.notices.push(Notice::ComboUp { combo });
        }
    }

    /// Flag achievements as unlocked; returns the ids that were new.
    pub fn unlock_achievements(&mut self, ids: &[String]) -> Vec<String> {
        let mut fresh = Vec::new();
        for id in ids {
            if self.achievements.insert(id.clone()) {
                self.notices.push(Notice::AchievementUnlocked { id: id.clone() });
                fresh.push(id.clone());
            }
        }
        fresh
    }

    /// Local combo decay after the idle timeout.
    pub fn reset_combo(&mut self) {
        self.progression.combo = 0;
    }
}

// ── Settings ─────────────────────────────────────────────────────────

impl QuestStore {
    pub fn set_sound(&mut self, enabled: bool) {
        self.settings.sound = enabled;
    }

    pub fn set_theme(&mut self, theme: &str) {
        self.settings.theme = theme.to_string();
    }
}

// ── Social ───────────────────────────────────────────────────────────

impl QuestStore {
    pub fn replace_friends(&mut self, list: FriendsList) {
        self.social.friends = list.friends;
        self.social.requests = list.requests;
    }

    /// Offset 0 replaces the feed; later pages append.
    pub fn apply_feed_page(&mut self, offset: usize, page: FeedPage) {
        let feed = &mut self.social.feed;
        if offset == 0 {
            feed.clear();
        } else {
            feed.truncate(offset);
        }
        let received = page.items.len();
        feed.extend(page.items);
        self.social.feed_next_offset = offset + received;
        self.social.feed_has_more = page.has_more;
    }

    pub fn set_search_results(&mut self, query: &str, users: Vec<UserSummary>) {
        self.social.search_query = Some(query.to_string());
        self.social.search_results = users;
    }
}
