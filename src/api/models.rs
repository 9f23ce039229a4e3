//! Wire types exchanged with the quest backend (REST bodies and push payloads).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Server-assigned identifier. The backend may send it as a JSON number or
/// string; both normalise to the same text form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RemoteId {
    fn from(value: u64) -> Self {
        RemoteId(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RemoteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(RemoteId(n.to_string())),
            Raw::Text(s) if !s.trim().is_empty() => Ok(RemoteId(s)),
            Raw::Text(_) => Err(serde::de::Error::custom("empty id")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Attachment shown next to a quest.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Media {
    pub kind: MediaKind,
    pub url: String,
}

/// A quest as the backend describes it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskRecord {
    pub id: RemoteId,
    pub text: String,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub media: Option<Media>,
}

/// Progression counters. Always server-computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progression {
    #[serde(default = "first_level")]
    pub level: u32,
    #[serde(default)]
    pub xp: u32,
    #[serde(default = "first_level_xp_max")]
    pub xp_max: u32,
    #[serde(default, alias = "completedCount")]
    pub completed: u32,
    #[serde(default, alias = "streakDays")]
    pub streak: u32,
    #[serde(default, alias = "comboCount")]
    pub combo: u32,
}

fn first_level() -> u32 {
    1
}

fn first_level_xp_max() -> u32 {
    100
}

impl Default for Progression {
    fn default() -> Self {
        Progression {
            level: first_level(),
            xp: 0,
            xp_max: first_level_xp_max(),
            completed: 0,
            streak: 0,
            combo: 0,
        }
    }
}

/// `GET /api/state`: everything needed to rebuild the store.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(flatten)]
    pub progression: Progression,
    #[serde(default)]
    pub achievements: BTreeMap<String, bool>,
    #[serde(default)]
    pub sound: bool,
    #[serde(default)]
    pub theme: Option<String>,
}

/// Reply to `POST /api/tasks/{id}/complete`, also the body of a
/// `task_completed` push. Every progression field is optional: whatever is
/// present overwrites the local value, whatever is absent is left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    #[serde(default)]
    pub xp_earned: Option<u32>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub xp: Option<u32>,
    #[serde(default)]
    pub xp_max: Option<u32>,
    #[serde(default)]
    pub completed: Option<u32>,
    #[serde(default)]
    pub streak: Option<u32>,
    #[serde(default)]
    pub combo: Option<u32>,
    #[serde(default)]
    pub leveled_up: bool,
    #[serde(default)]
    pub new_achievements: Vec<String>,
}

/// Generic `{success: true}` acknowledgement. A `false` flag is already
/// turned into [`Reply::Unusable`](crate::api::Reply) by the transport.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Ack {}

/// Reply to a media upload.
#[derive(Clone, Debug, Deserialize)]
pub struct MediaReply {
    pub media: Media,
}

// ── Social ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Friend {
    pub id: RemoteId,
    pub username: String,
    #[serde(default)]
    pub level: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FriendRequest {
    pub id: RemoteId,
    #[serde(alias = "from")]
    pub username: String,
}

/// `GET /api/friends`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FriendsList {
    #[serde(default)]
    pub friends: Vec<Friend>,
    #[serde(default)]
    pub requests: Vec<FriendRequest>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserSummary {
    pub id: RemoteId,
    pub username: String,
    #[serde(default)]
    pub level: Option<u32>,
}

/// `GET /api/users/search`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserSearch {
    #[serde(default)]
    pub users: Vec<UserSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FeedItem {
    pub id: RemoteId,
    pub username: String,
    #[serde(alias = "action")]
    pub text: String,
    #[serde(default)]
    pub xp: Option<u32>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// One page of `GET /api/friends/feed`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub items: Vec<FeedItem>,
    #[serde(default)]
    pub has_more: bool,
}

// ── Push payloads ────────────────────────────────────────────────────

/// `task_updated`: only the fields that changed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TaskPatch {
    pub id: RemoteId,
    #[serde(default)]
    pub text: Option<String>,
    /// `Some(None)` when the payload carries an explicit `"media": null`.
    #[serde(default, deserialize_with = "present")]
    pub media: Option<Option<Media>>,
}

/// `task_deleted`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TaskRef {
    pub id: RemoteId,
}

/// `task_completed`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TaskCompletion {
    pub id: RemoteId,
    #[serde(flatten)]
    pub result: CompletionResult,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
