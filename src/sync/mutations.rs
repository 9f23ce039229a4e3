//! Optimistic quest mutations and their reconciliation.
//!
//! Each operation changes the store first, then issues its backend call.
//! A failed call leaves the optimistic change in place; the next full
//! reload corrects it.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;

use crate::api::media_kind_for;
use crate::api::models::{Ack, CompletionResult, MediaReply, RemoteId, TaskRecord};
use crate::history::HistoryEntry;
use crate::logging::{LogLevel, log_src};
use crate::store::TaskPhase;

use super::timers::TimerSlot;
use super::{Answer, SyncCore, SyncMsg};

pub const THEMES: [&str; 2] = ["dark", "light"];

/// Debounced text edit for one quest.
#[derive(Debug, Default)]
pub struct PendingEdit {
    pub(super) text: String,
    pub(super) timer: TimerSlot,
    /// Updates sent and not yet answered.
    pub(super) in_flight: u32,
}

// ── Create ───────────────────────────────────────────────────────────

impl SyncCore {
    pub fn create_task(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || !self.ensure_session() {
            return;
        }
        let local = self.store.insert_provisional(text);
        let api = self.api.clone();
        let text = text.to_string();
        self.dispatch(async move { api.create_task(&text).await }, move |reply| {
            SyncMsg::TaskCreated { local, reply }
        });
    }

    pub(super) fn on_task_created(&mut self, local: u64, reply: Answer<TaskRecord>) {
        match self.accept("add quest", reply) {
            Some(record) => {
                self.store.confirm_task(local, record);
            }
            None => self.store.mark_unsynced(local),
        }
    }
}

// ── Complete & delete ────────────────────────────────────────────────

impl SyncCore {
    /// Complete a quest. Returns `false` if it is unknown or already leaving.
    pub fn complete_task(&mut self, id: &RemoteId) -> bool {
        if !self.ensure_session() {
            return false;
        }
        let Some(task) = self.store.find(id) else {
            self.activity
                .log(LogLevel::Warn, format!("Quest {id} is gone"));
            return false;
        };
        let (text, xp) = (task.text.clone(), task.xp);
        if !self.store.begin_removal(id) {
            self.activity
                .log(LogLevel::Info, format!("Quest {id} is already leaving"));
            return false;
        }
        self.drop_edit(id);
        self.combo_timer.cancel();

        let combo = self.store.progression().combo;
        let api = self.api.clone();
        let call_id = id.clone();
        let reply_id = id.clone();
        self.dispatch(
            async move { api.complete_task(&call_id, combo).await },
            move |reply| SyncMsg::TaskCompleted {
                id: reply_id,
                text,
                xp,
                reply,
            },
        );
        self.schedule_leave(id.clone(), self.timings.complete_animation());
        true
    }

    pub(super) fn on_task_completed(
        &mut self,
        id: RemoteId,
        text: String,
        xp: u32,
        reply: Answer<CompletionResult>,
    ) {
        let accepted = self.accept(&format!("complete quest {id}"), reply);
        self.store.release_removal(&id, accepted.is_some());
        if let Some(result) = accepted {
            self.store.apply_completion(&id, &result);
            let earned = result.xp_earned.unwrap_or(xp);
            self.activity
                .log(LogLevel::Success, format!("✔ {text} (+{earned} XP)"));
            if let Err(err) = self.history.record(HistoryEntry::now(text, earned, Some("✔"))) {
                log_src!(self.activity, LogLevel::Warn, format!("History not saved: {err:#}"));
            }
        }
        self.arm_combo_timer();
    }

    /// Delete a quest. Returns `false` if it is unknown or already leaving.
    pub fn delete_task(&mut self, id: &RemoteId) -> bool {
        if !self.ensure_session() {
            return false;
        }
        if !self.store.begin_removal(id) {
            self.activity
                .log(LogLevel::Info, format!("Quest {id} is gone or already leaving"));
            return false;
        }
        self.drop_edit(id);
        let api = self.api.clone();
        let call_id = id.clone();
        let reply_id = id.clone();
        self.dispatch(async move { api.delete_task(&call_id).await }, move |reply| {
            SyncMsg::TaskDeleted { id: reply_id, reply }
        });
        self.schedule_leave(id.clone(), self.timings.delete_animation());
        true
    }

    pub(super) fn on_task_deleted(&mut self, id: RemoteId, reply: Answer<Ack>) {
        let deleted = self.accept(&format!("delete quest {id}"), reply).is_some();
        self.store.release_removal(&id, deleted);
        if deleted {
            self.activity
                .log(LogLevel::Info, format!("Quest {id} deleted"));
        }
    }

    fn schedule_leave(&self, id: RemoteId, delay: Duration) {
        let tx = self.tx.clone();
        self.rt.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SyncMsg::LeaveDue { id });
        });
    }

    pub(super) fn on_leave_due(&mut self, id: RemoteId) {
        let leaving = self
            .store
            .find(&id)
            .is_some_and(|task| task.phase == TaskPhase::Leaving);
        if leaving {
            self.store.remove_task_by_id(&id);
        }
    }
}

// ── Combo decay ──────────────────────────────────────────────────────

impl SyncCore {
    fn arm_combo_timer(&mut self) {
        if self.store.progression().combo == 0 || self.session != super::Session::Active {
            return;
        }
        self.combo_timer.arm(
            &self.rt,
            self.timings.combo_timeout(),
            &self.tx,
            |generation| SyncMsg::ComboExpired { generation },
        );
    }

    pub(super) fn on_combo_expired(&mut self, generation: u64) {
        if !self.combo_timer.fire(generation) {
            return;
        }
        let combo = self.store.progression().combo;
        self.store.reset_combo();
        self.activity
            .log(LogLevel::Info, format!("Combo x{combo} expired"));
        let api = self.api.clone();
        self.dispatch(async move { api.reset_combo().await }, |reply| {
            SyncMsg::ComboReset { reply }
        });
    }
}

// ── Edit ─────────────────────────────────────────────────────────────

impl SyncCore {
    /// Change a quest's text locally now and on the backend once typing
    /// settles. Blank text deletes the quest instead.
    pub fn edit_task(&mut self, id: &RemoteId, text: &str) {
        if !self.ensure_session() {
            return;
        }
        let text = text.trim();
        if text.is_empty() {
            self.delete_task(id);
            return;
        }
        let editable = self
            .store
            .find(id)
            .is_some_and(|task| task.phase == TaskPhase::Active);
        if !editable {
            self.activity
                .log(LogLevel::Warn, format!("Quest {id} cannot be edited right now"));
            return;
        }
        self.store.set_task_text(id, text);

        let edit = self.pending_edits.entry(id.clone()).or_default();
        edit.text = text.to_string();
        let due_id = id.clone();
        edit.timer.arm(&self.rt, self.timings.edit_debounce(), &self.tx, move |generation| {
            SyncMsg::EditDue {
                id: due_id,
                generation,
            }
        });
    }

    pub(super) fn on_edit_due(&mut self, id: RemoteId, generation: u64) {
        let Some(edit) = self.pending_edits.get_mut(&id) else {
            return;
        };
        if !edit.timer.fire(generation) {
            return;
        }
        edit.in_flight += 1;
        let text = edit.text.clone();
        let api = self.api.clone();
        let call_id = id.clone();
        self.dispatch(async move { api.edit_task(&call_id, &text).await }, move |reply| {
            SyncMsg::TaskEdited { id, reply }
        });
    }

    pub(super) fn on_task_edited(&mut self, id: RemoteId, reply: Answer<Ack>) {
        self.accept(&format!("edit quest {id}"), reply);
        let Some(edit) = self.pending_edits.get_mut(&id) else {
            return;
        };
        edit.in_flight = edit.in_flight.saturating_sub(1);
        if edit.in_flight == 0 && !edit.timer.is_armed() {
            self.pending_edits.remove(&id);
        }
    }

    /// Forget any edit for a quest that is going away.
    pub(super) fn drop_edit(&mut self, id: &RemoteId) {
        if let Some(mut edit) = self.pending_edits.remove(id) {
            edit.timer.cancel();
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────────

impl SyncCore {
    pub fn toggle_sound(&mut self) {
        if !self.ensure_session() {
            return;
        }
        let enabled = !self.store.settings().sound;
        self.store.set_sound(enabled);
        self.activity.log(
            LogLevel::Info,
            format!("Sound {}", if enabled { "on" } else { "off" }),
        );
        let api = self.api.clone();
        self.dispatch(
            async move { api.update_settings(json!({ "sound": enabled })).await },
            |reply| SyncMsg::SettingsSaved {
                what: "sound setting",
                reply,
            },
        );
    }

    pub fn set_theme(&mut self, theme: &str) {
        if !THEMES.contains(&theme) {
            self.activity.log(
                LogLevel::Warn,
                format!("Unknown theme `{theme}`; choose one of: {}", THEMES.join(", ")),
            );
            return;
        }
        if !self.ensure_session() {
            return;
        }
        self.store.set_theme(theme);
        self.activity
            .log(LogLevel::Info, format!("Theme set to {theme}"));
        let api = self.api.clone();
        let theme = theme.to_string();
        self.dispatch(
            async move { api.update_settings(json!({ "theme": theme })).await },
            |reply| SyncMsg::SettingsSaved {
                what: "theme",
                reply,
            },
        );
    }
}

// ── Media ────────────────────────────────────────────────────────────

impl SyncCore {
    pub fn attach_media(&mut self, id: &RemoteId, path: PathBuf) {
        if !self.ensure_session() {
            return;
        }
        if media_kind_for(&path).is_none() {
            self.activity.log(
                LogLevel::Warn,
                format!("{} is not an image or video", path.display()),
            );
            return;
        }
        if self.store.find(id).is_none() {
            self.activity
                .log(LogLevel::Warn, format!("Quest {id} is gone"));
            return;
        }
        self.activity
            .log(LogLevel::Info, format!("Uploading {}…", path.display()));
        let api = self.api.clone();
        let call_id = id.clone();
        let reply_id = id.clone();
        self.dispatch(
            async move { api.upload_media(&call_id, &path).await },
            move |reply| SyncMsg::MediaUploaded { id: reply_id, reply },
        );
    }

    pub(super) fn on_media_uploaded(&mut self, id: RemoteId, reply: Answer<MediaReply>) {
        let Some(uploaded) = self.accept("upload media", reply) else {
            return;
        };
        if self.store.set_task_media(&id, Some(uploaded.media)) {
            self.activity
                .log(LogLevel::Success, format!("Media attached to quest {id}"));
        }
    }

    pub fn clear_media(&mut self, id: &RemoteId) {
        if !self.ensure_session() {
            return;
        }
        let has_media = self.store.find(id).is_some_and(|task| task.media.is_some());
        if !has_media {
            self.activity
                .log(LogLevel::Info, format!("Quest {id} has no media"));
            return;
        }
        self.store.set_task_media(id, None);
        let api = self.api.clone();
        let call_id = id.clone();
        let reply_id = id.clone();
        self.dispatch(async move { api.delete_media(&call_id).await }, move |reply| {
            SyncMsg::MediaRemoved { id: reply_id, reply }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{core_for, load, pump_until, settle};
    use crate::api::models::{Media, MediaKind, RemoteId};
    use crate::logging::LogLevel;
    use crate::test_support::{Canned, FakeBackend};
    use serde_json::json;
    use std::time::Duration;

    fn backend() -> FakeBackend {
        FakeBackend::start(|request| match (request.method.as_str(), request.url.as_str()) {
            ("GET", "/api/state") => Canned::json(
                200,
                json!({
                    "tasks": [{
                        "id": 8, "text": "Walk", "xp": 20,
                        "media": {"kind": "image", "url": "/uploads/old.png"}
                    }],
                    "sound": false, "theme": "dark"
                }),
            ),
            ("POST", "/api/tasks/8/media") => Canned::json(
                200,
                json!({"media": {"kind": "video", "url": "/uploads/new.mp4"}}),
            ),
            _ => Canned::json(200, json!({"success": true})),
        })
    }

    #[tokio::test]
    async fn settings_apply_locally_then_persist() {
        let backend = backend();
        let mut core = core_for(&backend);
        load(&mut core).await;

        core.toggle_sound();
        assert!(core.store().settings().sound);
        core.set_theme("light");
        assert_eq!(core.store().settings().theme, "light");
        core.set_theme("neon");
        assert_eq!(core.store().settings().theme, "light");

        settle(&mut core, Duration::from_millis(150)).await;
        let bodies: Vec<_> = backend
            .requests()
            .into_iter()
            .filter(|r| r.url == "/api/settings")
            .map(|r| r.json())
            .collect();
        assert_eq!(bodies.len(), 2);
        assert!(bodies.contains(&json!({"sound": true})));
        assert!(bodies.contains(&json!({"theme": "light"})));
    }

    #[tokio::test]
    async fn media_upload_and_removal() {
        let backend = backend();
        let mut core = core_for(&backend);
        load(&mut core).await;

        let file = std::env::temp_dir().join(format!("questline-{}-clip.mp4", std::process::id()));
        std::fs::write(&file, b"not really a video").unwrap();
        let id = RemoteId::from(8);
        core.attach_media(&id, file.clone());
        pump_until(&mut core, |core| {
            core.store().tasks()[0].media.as_ref().map(|m| m.kind) == Some(MediaKind::Video)
        })
        .await;
        let upload = backend.last_request().unwrap();
        assert!(
            upload
                .header("Content-Type")
                .unwrap()
                .starts_with("multipart/form-data")
        );

        core.clear_media(&id);
        assert_eq!(core.store().tasks()[0].media, None::<Media>);
        settle(&mut core, Duration::from_millis(100)).await;
        assert_eq!(backend.count("DELETE", "/api/tasks/8/media"), 1);
        let _ = std::fs::remove_file(file);
    }

    #[tokio::test]
    async fn unsupported_media_is_refused_before_any_call() {
        let backend = backend();
        let mut core = core_for(&backend);
        load(&mut core).await;
        let before = backend.requests().len();

        core.attach_media(&RemoteId::from(8), "notes.txt".into());
        assert_eq!(core.activity().count(LogLevel::Warn, "not an image or video"), 1);
        assert_eq!(backend.requests().len(), before);
    }

    #[tokio::test]
    async fn leaving_quest_cannot_be_completed_twice() {
        let backend = backend();
        let mut core = core_for(&backend);
        load(&mut core).await;

        let id = RemoteId::from(8);
        assert!(core.complete_task(&id));
        assert!(!core.complete_task(&id));
        assert!(!core.delete_task(&id));
        settle(&mut core, Duration::from_millis(100)).await;
        assert_eq!(backend.count("POST", "/api/tasks/8/complete"), 1);
    }
}
