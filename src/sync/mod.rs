//! Sync core: owns the quest store and is the only place it is mutated.
//!
//! Network calls and timers run as tasks on the tokio runtime and report
//! back as [`SyncMsg`] values over an unbounded channel. The UI loop drains
//! that channel every tick and feeds each message to [`SyncCore::apply`],
//! so reconciliation is strictly sequential even though the I/O is not.

pub mod mutations;
pub mod refresh;
pub mod social;
pub mod timers;

use std::collections::HashMap;
use std::future::Future;

use anyhow::Result;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::achievements;
use crate::api::models::{
    Ack, CompletionResult, FeedPage, FriendsList, MediaReply, RemoteId, StateSnapshot, TaskRecord,
    UserSearch,
};
use crate::api::{ApiClient, Reply, TabId};
use crate::config::{ClientConfig, Timings};
use crate::history::HistoryLedger;
use crate::logging::{ActivityLog, LogLevel, log_src};
use crate::push::sse::{Inbound, PushEvent};
use crate::push::{Backoff, FailureOutcome, PushChannel, PushSignal, PushState};
use crate::store::{Notice, QuestStore};

use self::mutations::PendingEdit;
use self::refresh::{RefreshScheduler, RefreshTrigger};
use self::timers::TimerSlot;

pub type SyncSender = mpsc::UnboundedSender<SyncMsg>;

/// Outcome of one backend call as it arrives back on the loop.
pub type Answer<T> = Result<Reply<T>>;

/// Everything that can happen to the sync core from outside the loop.
#[derive(Debug)]
pub enum SyncMsg {
    Push { generation: u64, signal: PushSignal },
    PushRetryDue { generation: u64 },
    RefreshTick,
    StateLoaded { trigger: RefreshTrigger, reply: Answer<StateSnapshot> },
    TaskCreated { local: u64, reply: Answer<TaskRecord> },
    TaskCompleted { id: RemoteId, text: String, xp: u32, reply: Answer<CompletionResult> },
    TaskDeleted { id: RemoteId, reply: Answer<Ack> },
    EditDue { id: RemoteId, generation: u64 },
    TaskEdited { id: RemoteId, reply: Answer<Ack> },
    LeaveDue { id: RemoteId },
    ComboExpired { generation: u64 },
    ComboReset { reply: Answer<Ack> },
    SettingsSaved { what: &'static str, reply: Answer<Ack> },
    MediaUploaded { id: RemoteId, reply: Answer<MediaReply> },
    MediaRemoved { id: RemoteId, reply: Answer<Ack> },
    Friends { reply: Answer<FriendsList> },
    FriendAction { label: String, reply: Answer<Ack> },
    SearchResults { query: String, reply: Answer<UserSearch> },
    FeedPage { offset: usize, reply: Answer<FeedPage> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Session {
    Active,
    /// The backend answered 401. Push and refresh are stopped; the caller
    /// should send the user to the entry point.
    Expired,
}

pub struct SyncCore {
    pub(crate) store: QuestStore,
    pub(crate) activity: ActivityLog,
    pub(crate) history: HistoryLedger,
    api: ApiClient,
    rt: Handle,
    tx: SyncSender,
    rx: mpsc::UnboundedReceiver<SyncMsg>,
    push: PushChannel,
    scheduler: RefreshScheduler,
    timings: Timings,
    combo_timer: TimerSlot,
    pending_edits: HashMap<RemoteId, PendingEdit>,
    session: Session,
    /// Set once on expiry; taken by the shell to open the entry point.
    expired_redirect: Option<String>,
}

impl SyncCore {
    pub fn new(config: &ClientConfig, history: HistoryLedger, rt: Handle) -> Result<Self> {
        let api = ApiClient::new(config, TabId::generate())?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(SyncCore {
            store: QuestStore::default(),
            activity: ActivityLog::default(),
            history,
            api,
            rt,
            tx,
            rx,
            push: PushChannel::new(Backoff::from_timings(&config.timings)),
            scheduler: RefreshScheduler::new(config.timings.periodic_refresh()),
            timings: config.timings.clone(),
            combo_timer: TimerSlot::default(),
            pending_edits: HashMap::new(),
            session: Session::Active,
            expired_redirect: None,
        })
    }

    /// Initial load, push subscription, and the periodic fallback tick.
    pub fn start(&mut self) {
        self.refresh(RefreshTrigger::Initial);
        self.push.connect(&self.api, &self.rt, &self.tx);
        self.scheduler.start(&self.rt, &self.tx);
    }

    /// Stop every background activity. Idempotent.
    pub fn shutdown(&mut self) {
        self.push.shutdown();
        self.scheduler.stop();
        self.combo_timer.cancel();
        for (_, mut edit) in self.pending_edits.drain() {
            edit.timer.cancel();
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn store(&self) -> &QuestStore {
        &self.store
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    pub fn push_state(&self) -> PushState {
        self.push.state()
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn tab_id(&self) -> &TabId {
        self.api.tab_id()
    }

    pub fn entry_point(&self) -> String {
        self.api.entry_point()
    }

    #[cfg(test)]
    pub fn has_pending_edit(&self, id: &RemoteId) -> bool {
        self.pending_edits.contains_key(id)
    }

    /// Entry point to open after the session expired. Yields once.
    pub fn take_expired_redirect(&mut self) -> Option<String> {
        self.expired_redirect.take()
    }

    pub fn log(&mut self, level: LogLevel, message: String) {
        self.activity.log(level, message);
    }

    pub fn clear_activity(&mut self) {
        self.activity.clear();
    }

    // ── Message pump ─────────────────────────────────────────────────

    /// Apply every message that is already queued. Returns how many ran.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(msg) = self.rx.try_recv() {
            self.apply(msg);
            applied += 1;
        }
        applied
    }

    /// Wait for the next message and apply it.
    #[cfg(test)]
    pub async fn step(&mut self) {
        if let Some(msg) = self.rx.recv().await {
            self.apply(msg);
        }
    }

    pub fn apply(&mut self, msg: SyncMsg) {
        match msg {
            SyncMsg::Push { generation, signal } => self.on_push(generation, signal),
            SyncMsg::PushRetryDue { generation } => {
                if self.push.on_retry_due(generation) {
                    self.push.connect(&self.api, &self.rt, &self.tx);
                }
            }
            SyncMsg::RefreshTick => self.refresh(RefreshTrigger::Periodic),
            SyncMsg::StateLoaded { trigger, reply } => self.on_state_loaded(trigger, reply),
            SyncMsg::TaskCreated { local, reply } => self.on_task_created(local, reply),
            SyncMsg::TaskCompleted { id, text, xp, reply } => {
                self.on_task_completed(id, text, xp, reply)
            }
            SyncMsg::TaskDeleted { id, reply } => self.on_task_deleted(id, reply),
            SyncMsg::EditDue { id, generation } => self.on_edit_due(id, generation),
            SyncMsg::TaskEdited { id, reply } => self.on_task_edited(id, reply),
            SyncMsg::LeaveDue { id } => self.on_leave_due(id),
            SyncMsg::ComboExpired { generation } => self.on_combo_expired(generation),
            SyncMsg::ComboReset { reply } => {
                self.accept("reset combo", reply);
            }
            SyncMsg::SettingsSaved { what, reply } => {
                self.accept(&format!("save {what}"), reply);
            }
            SyncMsg::MediaUploaded { id, reply } => self.on_media_uploaded(id, reply),
            SyncMsg::MediaRemoved { id, reply } => {
                if self.accept("remove media", reply).is_some() {
                    self.activity
                        .log(LogLevel::Info, format!("Media removed from quest {id}"));
                }
            }
            SyncMsg::Friends { reply } => self.on_friends(reply),
            SyncMsg::FriendAction { label, reply } => self.on_friend_action(label, reply),
            SyncMsg::SearchResults { query, reply } => self.on_search_results(query, reply),
            SyncMsg::FeedPage { offset, reply } => self.on_feed_page(offset, reply),
        }
        self.announce_notices();
    }

    // ── Plumbing shared by every operation ───────────────────────────

    /// Run `call` on the runtime and post its outcome back wrapped by `wrap`.
    fn dispatch<T, Fut, W>(&self, call: Fut, wrap: W)
    where
        T: Send + 'static,
        Fut: Future<Output = Answer<T>> + Send + 'static,
        W: FnOnce(Answer<T>) -> SyncMsg + Send + 'static,
    {
        let tx = self.tx.clone();
        self.rt.spawn(async move {
            let _ = tx.send(wrap(call.await));
        });
    }

    /// Uniform reply handling. Only a usable body comes back; everything
    /// else is logged (or expires the session) and reconciles nothing.
    fn accept<T>(&mut self, what: &str, reply: Answer<T>) -> Option<T> {
        if self.session == Session::Expired {
            return None;
        }
        match reply {
            Ok(Reply::Body(body)) => Some(body),
            Ok(Reply::Unusable(reason)) => {
                log_src!(self.activity, LogLevel::Warn, format!("{what}: {reason}"));
                None
            }
            Ok(Reply::Unauthorized) => {
                self.expire_session();
                None
            }
            Err(err) => {
                log_src!(self.activity, LogLevel::Warn, format!("{what} failed: {err:#}"));
                None
            }
        }
    }

    /// Refuse new operations once the session is gone.
    fn ensure_session(&mut self) -> bool {
        if self.session == Session::Expired {
            self.activity.log(
                LogLevel::Warn,
                "Session expired; sign in again and restart".to_string(),
            );
            return false;
        }
        true
    }

    fn expire_session(&mut self) {
        if self.session == Session::Expired {
            return;
        }
        self.session = Session::Expired;
        self.shutdown();
        let entry = self.api.entry_point();
        log_src!(
            self.activity,
            LogLevel::Error,
            format!("Session expired. Sign in again at {entry}")
        );
        self.expired_redirect = Some(entry);
    }

    fn announce_notices(&mut self) {
        for notice in self.store.drain_notices() {
            let message = match notice {
                Notice::QuestAdded { text, xp } => format!("✚ Quest added: {text} (+{xp} XP)"),
                Notice::LevelUp { level } => format!("⬆ Level up! You reached level {level}"),
                Notice::AchievementUnlocked { id } => {
                    format!("Achievement unlocked: {}", achievements::label(&id))
                }
                Notice::ComboUp { combo } => format!("🔥 Combo x{combo}!"),
            };
            self.activity.log(LogLevel::Success, message);
        }
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Request a full-state reload. Coalesces with one already in flight.
    pub fn refresh(&mut self, trigger: RefreshTrigger) {
        if self.session == Session::Expired {
            return;
        }
        if !self.scheduler.should_reload(trigger, self.push.is_connected()) {
            if trigger == RefreshTrigger::Manual {
                self.activity
                    .log(LogLevel::Info, "Reload already in progress".to_string());
            }
            return;
        }
        let api = self.api.clone();
        self.dispatch(async move { api.fetch_state().await }, move |reply| {
            SyncMsg::StateLoaded { trigger, reply }
        });
    }

    /// The terminal lost or regained visibility.
    pub fn on_visibility(&mut self, visible: bool) {
        if self.scheduler.set_visible(visible) {
            self.refresh(RefreshTrigger::Visible);
        }
    }

    pub fn on_focus(&mut self) {
        self.refresh(RefreshTrigger::Focus);
    }

    fn on_state_loaded(&mut self, trigger: RefreshTrigger, reply: Answer<StateSnapshot>) {
        self.scheduler.finished();
        let Some(snapshot) = self.accept(&format!("reload ({})", trigger.label()), reply) else {
            return;
        };
        self.store.merge_full_state(snapshot);
        if matches!(trigger, RefreshTrigger::Initial | RefreshTrigger::Manual) {
            let progression = self.store.progression();
            let message = format!(
                "Loaded {} quests · level {} · {}/{} XP",
                self.store.tasks().len(),
                progression.level,
                progression.xp,
                progression.xp_max
            );
            self.activity.log(LogLevel::Info, message);
        }
    }

    // ── Push ─────────────────────────────────────────────────────────

    fn on_push(&mut self, generation: u64, signal: PushSignal) {
        match signal {
            PushSignal::Opened => {
                let was_retrying = self.push.attempts() > 0;
                if self.push.on_opened(generation) {
                    self.activity
                        .log(LogLevel::Success, "Live updates connected".to_string());
                    if was_retrying {
                        self.refresh(RefreshTrigger::Reconnected);
                    }
                }
            }
            PushSignal::Event(inbound) => {
                if self.push.accepts(generation) {
                    self.apply_push_event(inbound);
                }
            }
            PushSignal::Ignored(reason) => {
                log_src!(self.activity, LogLevel::Warn, format!("Ignored push event: {reason}"));
            }
            PushSignal::Failed(reason) => match self.push.on_failure(generation) {
                FailureOutcome::Retry { attempt, delay } => {
                    log_src!(
                        self.activity,
                        LogLevel::Warn,
                        format!(
                            "Live updates lost ({reason}); retry #{attempt} in {}s",
                            delay.as_secs_f32()
                        )
                    );
                    self.push.schedule_retry(delay, &self.rt, &self.tx);
                }
                FailureOutcome::GaveUp => {
                    log_src!(
                        self.activity,
                        LogLevel::Error,
                        format!(
                            "Live updates unavailable ({reason}); falling back to periodic reload"
                        )
                    );
                }
                FailureOutcome::Stale => {}
            },
            PushSignal::Unauthorized => {
                if self.push.accepts(generation) {
                    self.expire_session();
                }
            }
        }
    }

    /// Reconcile one push event. Echoes of this instance's own changes go
    /// through the same idempotent paths as everything else.
    pub(crate) fn apply_push_event(&mut self, inbound: Inbound) {
        #[cfg(feature = "debug-logs")]
        let trace = format!(
            "push {}{}",
            inbound.event.kind(),
            if inbound.origin.as_deref() == Some(self.api.tab_id().as_str()) {
                " (own echo)"
            } else {
                ""
            }
        );
        match inbound.event {
            PushEvent::Connected => {}
            PushEvent::TaskCreated(record) => {
                self.store.upsert_task(record);
            }
            PushEvent::TaskUpdated(patch) => {
                let keep_local_text = self.pending_edits.contains_key(&patch.id);
                self.store.apply_patch(patch, keep_local_text);
            }
            PushEvent::TaskDeleted(task) => self.remove_pushed(&task.id),
            PushEvent::TaskCompleted(completion) => {
                self.store
                    .apply_completion(&completion.id, &completion.result);
                self.remove_pushed(&completion.id);
            }
        }
        #[cfg(feature = "debug-logs")]
        self.activity.log(LogLevel::Info, trace);
    }

    fn remove_pushed(&mut self, id: &RemoteId) {
        // A local removal already owns this quest; its leave timer drops it.
        if self.store.is_removing(id) {
            return;
        }
        self.drop_edit(id);
        self.store.remove_task_by_id(id);
    }
}

impl Drop for SyncCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Resolve a 1-based list position to a confirmed quest id.
pub fn resolve_position(store: &QuestStore, position: usize) -> Result<RemoteId, String> {
    let task = store
        .task_at(position)
        .ok_or_else(|| format!("No quest #{position}"))?;
    task.id
        .remote()
        .cloned()
        .ok_or_else(|| format!("Quest #{position} is not saved yet; try again in a moment"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::models::{TaskCompletion, TaskRef};
    use crate::store::{TaskId, TaskPhase};
    use crate::test_support::{Canned, FakeBackend};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub(crate) fn fast_timings() -> Timings {
        Timings {
            combo_timeout_ms: 80,
            edit_debounce_ms: 40,
            complete_animation_ms: 10,
            delete_animation_ms: 10,
            reconnect_base_delay_ms: 10,
            reconnect_max_attempts: 2,
            periodic_refresh_ms: 60_000,
            feed_page_size: 2,
        }
    }

    pub(crate) fn core_for(backend: &FakeBackend) -> SyncCore {
        let config = ClientConfig {
            base_url: backend.base_url(),
            session: Some("s3cret".to_string()),
            timings: fast_timings(),
            ..ClientConfig::default()
        };
        SyncCore::new(&config, HistoryLedger::in_memory(), Handle::current()).unwrap()
    }

    /// Pump messages until `done` holds, failing after two seconds.
    pub(crate) async fn pump_until(core: &mut SyncCore, done: impl Fn(&SyncCore) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done(core) {
                core.step().await;
            }
        })
        .await
        .expect("condition reached before timeout");
    }

    /// Apply whatever arrives within `window`.
    pub(crate) async fn settle(core: &mut SyncCore, window: Duration) {
        let _ = tokio::time::timeout(window, async {
            loop {
                core.step().await;
            }
        })
        .await;
    }

    pub(crate) async fn load(core: &mut SyncCore) {
        core.refresh(RefreshTrigger::Manual);
        pump_until(core, |core| core.store().snapshot().loaded).await;
    }

    fn state_with(tasks: serde_json::Value) -> Canned {
        Canned::json(
            200,
            json!({
                "tasks": tasks,
                "level": 2, "xp": 40, "xpMax": 120,
                "completed": 4, "streak": 1, "combo": 2,
                "achievements": {"firstQuest": true},
                "sound": false
            }),
        )
    }

    fn remote(id: u64) -> TaskId {
        TaskId::Remote(RemoteId::from(id))
    }

    #[tokio::test]
    async fn created_quest_replaces_its_placeholder() {
        let backend = FakeBackend::start(|request| match request.url.as_str() {
            "/api/tasks" => Canned::json(200, json!({"id": 42, "text": "Buy milk", "xp": 10})),
            _ => state_with(json!([])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        core.create_task("Buy milk");
        assert_eq!(core.store().tasks()[0].phase, TaskPhase::Pending);
        assert_eq!(core.store().tasks()[0].text, "Buy milk");

        pump_until(&mut core, |core| core.store().tasks()[0].id == remote(42)).await;
        let tasks = core.store().tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].xp, 10);
        assert_eq!(core.activity().count(LogLevel::Success, "Quest added: Buy milk"), 1);
    }

    #[tokio::test]
    async fn echo_racing_the_reply_leaves_one_quest() {
        let backend = FakeBackend::start(|request| match request.url.as_str() {
            "/api/tasks" => Canned::json(200, json!({"id": 42, "text": "Buy milk", "xp": 10})),
            _ => state_with(json!([])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        core.create_task("Buy milk");
        let own_tab = core.tab_id().as_str().to_string();
        core.apply_push_event(Inbound {
            event: PushEvent::TaskCreated(TaskRecord {
                id: RemoteId::from(42),
                text: "Buy milk".to_string(),
                xp: 10,
                media: None,
            }),
            origin: Some(own_tab),
        });
        pump_until(&mut core, |core| {
            core.store().tasks().iter().all(|t| t.phase != TaskPhase::Pending)
        })
        .await;
        assert_eq!(core.store().tasks().len(), 1);
        assert_eq!(core.store().tasks()[0].id, remote(42));
    }

    #[tokio::test]
    async fn failed_create_keeps_placeholder_until_reload() {
        let backend = FakeBackend::start(|request| match request.url.as_str() {
            "/api/tasks" => Canned::json(500, json!({"error": "boom"})),
            _ => state_with(json!([])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        core.create_task("Fragile");
        pump_until(&mut core, |core| core.store().tasks()[0].phase == TaskPhase::Unsynced).await;
        assert_eq!(core.activity().count(LogLevel::Warn, "boom"), 1);

        core.refresh(RefreshTrigger::Manual);
        pump_until(&mut core, |core| core.store().tasks().is_empty()).await;
    }

    #[tokio::test]
    async fn completion_reconciles_server_progression() {
        let backend = FakeBackend::start(|request| match request.url.as_str() {
            "/api/tasks/42/complete" => Canned::json(
                200,
                json!({
                    "xpEarned": 27, "level": 3, "xp": 12, "xpMax": 144,
                    "completed": 5, "streak": 1, "combo": 3,
                    "leveledUp": true, "newAchievements": ["fiveQuests"]
                }),
            ),
            "/api/combo/reset" => Canned::json(200, json!({"success": true})),
            _ => state_with(json!([{"id": 42, "text": "Read a chapter", "xp": 20}])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        assert!(core.complete_task(&RemoteId::from(42)));
        pump_until(&mut core, |core| {
            core.store().progression().level == 3 && core.store().tasks().is_empty()
        })
        .await;

        let completion = backend
            .requests()
            .into_iter()
            .find(|r| r.url == "/api/tasks/42/complete")
            .unwrap();
        assert_eq!(completion.json()["combo"], 2);

        let progression = *core.store().progression();
        assert_eq!((progression.xp, progression.xp_max, progression.combo), (12, 144, 3));
        assert!(core.store().is_unlocked("fiveQuests"));
        assert_eq!(core.history().entries().next().unwrap().points, 27);

        // The push echo of the same completion announces nothing new.
        core.apply_push_event(Inbound {
            event: PushEvent::TaskCompleted(TaskCompletion {
                id: RemoteId::from(42),
                result: CompletionResult {
                    level: Some(3),
                    combo: Some(3),
                    leveled_up: true,
                    new_achievements: vec!["fiveQuests".to_string()],
                    ..CompletionResult::default()
                },
            }),
            origin: Some(core.tab_id().as_str().to_string()),
        });
        core.announce_notices();
        assert_eq!(core.activity().count(LogLevel::Success, "Level up"), 1);
        assert_eq!(core.activity().count(LogLevel::Success, "Traveller"), 1);
        assert_eq!(core.activity().count(LogLevel::Success, "Combo x3"), 1);
    }

    #[tokio::test]
    async fn idle_combo_is_reset_once() {
        let backend = FakeBackend::start(|request| match request.url.as_str() {
            "/api/tasks/42/complete" => Canned::json(200, json!({"xpEarned": 20, "combo": 3})),
            "/api/combo/reset" => Canned::json(200, json!({"success": true})),
            _ => state_with(json!([{"id": 42, "text": "Stretch", "xp": 20}])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        core.complete_task(&RemoteId::from(42));
        pump_until(&mut core, |core| core.store().progression().combo == 3).await;
        pump_until(&mut core, |core| core.store().progression().combo == 0).await;
        settle(&mut core, Duration::from_millis(200)).await;
        assert_eq!(backend.count("POST", "/api/combo/reset"), 1);
    }

    #[tokio::test]
    async fn completing_again_cancels_the_combo_timer() {
        let backend = FakeBackend::start(|request| match request.url.as_str() {
            "/api/tasks/1/complete" => Canned::json(200, json!({"combo": 1})),
            "/api/tasks/2/complete" => Canned::json(200, json!({"combo": 2})),
            "/api/combo/reset" => Canned::json(200, json!({"success": true})),
            _ => state_with(json!([
                {"id": 1, "text": "one", "xp": 20},
                {"id": 2, "text": "two", "xp": 20}
            ])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        core.complete_task(&RemoteId::from(1));
        pump_until(&mut core, |core| core.store().progression().combo == 1).await;
        core.complete_task(&RemoteId::from(2));
        pump_until(&mut core, |core| core.store().progression().combo == 2).await;
        assert_eq!(backend.count("POST", "/api/combo/reset"), 0);
        pump_until(&mut core, |core| core.store().progression().combo == 0).await;
        assert_eq!(backend.count("POST", "/api/combo/reset"), 1);
    }

    #[tokio::test]
    async fn rapid_edits_send_one_update_with_the_final_text() {
        let backend = FakeBackend::start(|request| match request.method.as_str() {
            "PUT" => Canned::json(200, json!({"success": true})),
            _ => state_with(json!([{"id": 5, "text": "Draft", "xp": 20}])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        let id = RemoteId::from(5);
        core.edit_task(&id, "Draft a");
        core.edit_task(&id, "Draft an");
        core.edit_task(&id, "Draft an essay");
        assert_eq!(core.store().tasks()[0].text, "Draft an essay");

        pump_until(&mut core, |core| !core.has_pending_edit(&RemoteId::from(5))).await;
        let puts: Vec<_> = backend
            .requests()
            .into_iter()
            .filter(|r| r.method == "PUT")
            .collect();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].url, "/api/tasks/5");
        assert_eq!(puts[0].json()["text"], "Draft an essay");
    }

    #[tokio::test]
    async fn clearing_the_text_deletes_the_quest() {
        let backend = FakeBackend::start(|request| match request.method.as_str() {
            "DELETE" => Canned::json(200, json!({"success": true})),
            _ => state_with(json!([{"id": 5, "text": "Draft", "xp": 20}])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        core.edit_task(&RemoteId::from(5), "   ");
        pump_until(&mut core, |core| core.store().tasks().is_empty()).await;
        settle(&mut core, Duration::from_millis(100)).await;
        assert_eq!(backend.count("DELETE", "/api/tasks/5"), 1);
        assert_eq!(backend.requests().iter().filter(|r| r.method == "PUT").count(), 0);
    }

    #[tokio::test]
    async fn remote_rename_waits_for_local_edit() {
        let backend = FakeBackend::start(|request| match request.method.as_str() {
            "PUT" => Canned::json(200, json!({"success": true})),
            _ => state_with(json!([{"id": 5, "text": "Draft", "xp": 20}])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        core.edit_task(&RemoteId::from(5), "Mine");
        core.apply_push_event(Inbound {
            event: PushEvent::TaskUpdated(crate::api::models::TaskPatch {
                id: RemoteId::from(5),
                text: Some("Theirs".to_string()),
                media: None,
            }),
            origin: Some("other-tab".to_string()),
        });
        assert_eq!(core.store().tasks()[0].text, "Mine");
    }

    #[tokio::test]
    async fn deleting_an_unknown_quest_by_push_is_a_no_op() {
        let backend = FakeBackend::start(|_| {
            state_with(json!([{"id": 1, "text": "a", "xp": 20}, {"id": 2, "text": "b", "xp": 21}]))
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        let before = core.store().tasks().to_vec();
        core.apply_push_event(Inbound {
            event: PushEvent::TaskDeleted(TaskRef { id: RemoteId::from(99) }),
            origin: None,
        });
        assert_eq!(core.store().tasks(), before.as_slice());
        assert!(core.store.drain_notices().is_empty());
    }

    #[tokio::test]
    async fn stale_snapshot_cannot_resurrect_a_removed_quest() {
        let backend = FakeBackend::start(|request| match request.method.as_str() {
            "DELETE" => Canned::json(200, json!({"success": true})),
            _ => state_with(json!([{"id": 7, "text": "Doomed", "xp": 20}])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        core.delete_task(&RemoteId::from(7));
        core.store.merge_full_state(StateSnapshot {
            tasks: vec![TaskRecord {
                id: RemoteId::from(7),
                text: "Doomed".to_string(),
                xp: 20,
                media: None,
            }],
            ..StateSnapshot::default()
        });
        assert!(core.store().find(&RemoteId::from(7)).is_none());
        pump_until(&mut core, |core| !core.store().is_removing(&RemoteId::from(7))).await;
    }

    #[tokio::test]
    async fn snapshot_landing_after_the_reply_keeps_the_quest_gone() {
        let backend = FakeBackend::start(|request| match request.url.as_str() {
            "/api/tasks/42/complete" => Canned::json(200, json!({"success": true, "combo": 1})),
            "/api/combo/reset" => Canned::json(200, json!({"success": true})),
            _ => state_with(json!([{"id": 42, "text": "Water plants", "xp": 20}])),
        });
        let mut core = core_for(&backend);
        load(&mut core).await;

        assert!(core.complete_task(&RemoteId::from(42)));
        pump_until(&mut core, |core| core.store().progression().combo == 1).await;

        // A reload fetched before the completion lands afterwards.
        core.store.merge_full_state(StateSnapshot {
            tasks: vec![TaskRecord {
                id: RemoteId::from(42),
                text: "Water plants".to_string(),
                xp: 20,
                media: None,
            }],
            ..StateSnapshot::default()
        });
        settle(&mut core, Duration::from_millis(50)).await;
        assert!(core.store().find(&RemoteId::from(42)).is_none());
    }

    #[tokio::test]
    async fn unauthorized_expires_the_session() {
        let backend = FakeBackend::start(|_| Canned::json(401, json!({"error": "Unauthorized"})));
        let mut core = core_for(&backend);

        core.start();
        pump_until(&mut core, |core| core.session() == Session::Expired).await;
        assert_eq!(core.push_state(), PushState::Disconnected);
        assert_eq!(core.take_expired_redirect(), Some(format!("{}/", backend.base_url())));
        assert_eq!(core.take_expired_redirect(), None);

        core.create_task("too late");
        assert!(core.store().tasks().is_empty());
    }

    #[tokio::test]
    async fn push_events_stream_into_the_store() {
        let backend = FakeBackend::start(|request| {
            if request.url.starts_with("/api/events") {
                Canned::event_stream(concat!(
                    "event: connected\ndata: {\"tabId\":\"x\"}\n\n",
                    "event: task_created\ndata: {\"id\":9,\"text\":\"From phone\",\"xp\":15}\n\n",
                ))
            } else {
                state_with(json!([]))
            }
        });
        let mut core = core_for(&backend);
        core.start();
        pump_until(&mut core, |core| core.store().find(&RemoteId::from(9)).is_some()).await;
        assert_eq!(core.store().tasks().len(), 1);
        core.shutdown();
    }

    #[tokio::test]
    async fn reopening_after_a_failure_resets_attempts_and_reloads() {
        let subscribes = AtomicUsize::new(0);
        let backend = FakeBackend::start(move |request| {
            if !request.url.starts_with("/api/events") {
                return state_with(json!([]));
            }
            match subscribes.fetch_add(1, Ordering::SeqCst) {
                1 => Canned::event_stream("event: connected\ndata: {\"tabId\":\"x\"}\n\n"),
                _ => Canned::json(503, json!({"error": "down"})),
            }
        });
        let mut core = core_for(&backend);
        core.start();
        pump_until(&mut core, |core| core.push_state() == PushState::Connected).await;
        assert_eq!(core.push.attempts(), 0);
        assert_eq!(core.activity().count(LogLevel::Success, "Live updates connected"), 1);

        // Initial load plus the catch-up reload after reconnecting.
        pump_until(&mut core, |_| backend.count("GET", "/api/state") == 2).await;
        core.shutdown();
    }

    #[tokio::test]
    async fn push_gives_up_after_the_retry_ceiling() {
        let backend = FakeBackend::start(|request| {
            if request.url.starts_with("/api/events") {
                Canned::json(503, json!({"error": "down"}))
            } else {
                state_with(json!([]))
            }
        });
        let mut core = core_for(&backend);
        core.start();
        pump_until(&mut core, |core| {
            core.activity().count(LogLevel::Error, "Live updates unavailable") == 1
        })
        .await;
        assert_eq!(core.push_state(), PushState::Disconnected);
        let subscribes = backend
            .requests()
            .iter()
            .filter(|r| r.url.starts_with("/api/events"))
            .count();
        assert_eq!(subscribes, 3);
    }

    #[test]
    fn positions_resolve_only_confirmed_quests() {
        let mut store = QuestStore::default();
        store.upsert_task(TaskRecord {
            id: RemoteId::from(3),
            text: "saved".to_string(),
            xp: 20,
            media: None,
        });
        store.insert_provisional("draft");
        assert!(resolve_position(&store, 1).unwrap_err().contains("not saved"));
        assert_eq!(resolve_position(&store, 2), Ok(RemoteId::from(3)));
        assert!(resolve_position(&store, 3).is_err());
        assert!(resolve_position(&store, 0).is_err());
    }
}
