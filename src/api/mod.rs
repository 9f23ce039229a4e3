//! Transport client for the quest backend: every REST call and the push
//! subscription request go through [`ApiClient`].
//!
//! The client is deliberately dumb: it tags requests with the push identity,
//! maps HTTP 401 to [`Reply::Unauthorized`], and turns anything it cannot
//! use into [`Reply::Unusable`]. Reconciliation happens in the sync core.

pub mod models;

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rand::RngCore;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::config::ClientConfig;
use crate::constants::{APP_NAME, APP_VERSION, TAB_ID_HEADER, TAB_ID_PARAM};
use crate::util::{normalize_url, truncate_chars};

use self::models::{
    Ack, CompletionResult, FeedPage, FriendsList, MediaKind, MediaReply, RemoteId, StateSnapshot,
    TaskRecord, UserSearch,
};

/// Outcome of a call that reached the backend.
#[derive(Debug)]
pub enum Reply<T> {
    /// Parsed body of a successful response.
    Body(T),
    /// The backend answered, but nothing in the answer can be applied.
    Unusable(String),
    /// The session is no longer authenticated.
    Unauthorized,
}

/// Random per-instance token used to tag requests and the push subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabId(String);

impl TabId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        TabId(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Thin wrapper around the quest backend's HTTP API.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    tab_id: TabId,
    session_cookie: Option<String>,
    http_client: HttpClient,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, tab_id: TabId) -> Result<Self> {
        let http_client = HttpClient::builder()
            .user_agent(format!("{APP_NAME}/{APP_VERSION}"))
            .build()
            .context("build HTTP client")?;
        let session_cookie = config
            .session
            .as_ref()
            .filter(|value| !value.is_empty())
            .map(|value| format!("{}={}", config.cookie_name, value));
        Ok(ApiClient {
            base_url: normalize_url(&config.base_url),
            tab_id,
            session_cookie,
            http_client,
        })
    }

    pub fn tab_id(&self) -> &TabId {
        &self.tab_id
    }

    /// The unauthenticated entry point of the web app.
    pub fn entry_point(&self) -> String {
        format!("{}/", self.base_url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).with_context(|| format!("parse endpoint URL {raw}"))
    }

    /// URL of the push subscription for this instance.
    pub fn events_url(&self) -> Result<Url> {
        let mut url = self.endpoint("/api/events")?;
        url.query_pairs_mut()
            .append_pair(TAB_ID_PARAM, self.tab_id.as_str());
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .http_client
            .request(method, url)
            .header(TAB_ID_HEADER, self.tab_id.as_str());
        if let Some(cookie) = &self.session_cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder
    }

    /// Issue one JSON call and classify the answer.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Reply<T>> {
        let url = self.endpoint(path)?;
        let mut builder = self.request(method.clone(), url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder
            .send()
            .await
            .with_context(|| format!("send {method} {path}"))?;
        read_reply(response, &format!("{method} {path}")).await
    }

    /// Open the long-lived push subscription. The caller owns the body stream.
    pub async fn subscribe(&self) -> Result<Reply<Response>> {
        let url = self.events_url()?;
        let response = self
            .request(Method::GET, url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .context("open push subscription")?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Reply::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(Reply::Unusable(format!(
                "push subscription failed with {status}: {}",
                truncate_chars(body.trim(), 120)
            )));
        }
        Ok(Reply::Body(response))
    }

    // ── Endpoints ────────────────────────────────────────────────────

    pub async fn fetch_state(&self) -> Result<Reply<StateSnapshot>> {
        self.call(Method::GET, "/api/state", None).await
    }

    pub async fn create_task(&self, text: &str) -> Result<Reply<TaskRecord>> {
        self.call(Method::POST, "/api/tasks", Some(json!({ "text": text })))
            .await
    }

    pub async fn complete_task(
        &self,
        id: &RemoteId,
        combo: u32,
    ) -> Result<Reply<CompletionResult>> {
        self.call(
            Method::POST,
            &format!("/api/tasks/{id}/complete"),
            Some(json!({ "combo": combo })),
        )
        .await
    }

    pub async fn edit_task(&self, id: &RemoteId, text: &str) -> Result<Reply<Ack>> {
        self.call(Method::PUT, &format!("/api/tasks/{id}"), Some(json!({ "text": text })))
            .await
    }

    pub async fn delete_task(&self, id: &RemoteId) -> Result<Reply<Ack>> {
        self.call(Method::DELETE, &format!("/api/tasks/{id}"), None).await
    }

    pub async fn reset_combo(&self) -> Result<Reply<Ack>> {
        self.call(Method::POST, "/api/combo/reset", None).await
    }

    pub async fn update_settings(&self, patch: Value) -> Result<Reply<Ack>> {
        self.call(Method::PUT, "/api/settings", Some(patch)).await
    }

    pub async fn upload_media(&self, id: &RemoteId, file: &Path) -> Result<Reply<MediaReply>> {
        let kind = media_kind_for(file)
            .ok_or_else(|| anyhow!("unsupported media type: {}", file.display()))?;
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("read media file {}", file.display()))?;
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(file, kind))
            .context("build media part")?;
        let form = Form::new().part("file", part);

        let path = format!("/api/tasks/{id}/media");
        let response = self
            .request(Method::POST, self.endpoint(&path)?)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("send POST {path}"))?;
        read_reply(response, &format!("POST {path}")).await
    }

    pub async fn delete_media(&self, id: &RemoteId) -> Result<Reply<Ack>> {
        self.call(Method::DELETE, &format!("/api/tasks/{id}/media"), None)
            .await
    }

    pub async fn friends(&self) -> Result<Reply<FriendsList>> {
        self.call(Method::GET, "/api/friends", None).await
    }

    pub async fn send_friend_request(&self, username: &str) -> Result<Reply<Ack>> {
        self.call(
            Method::POST,
            "/api/friends/request",
            Some(json!({ "username": username })),
        )
        .await
    }

    pub async fn accept_friend_request(&self, id: &RemoteId) -> Result<Reply<Ack>> {
        self.call(Method::POST, &format!("/api/friends/{id}/accept"), None)
            .await
    }

    pub async fn decline_friend_request(&self, id: &RemoteId) -> Result<Reply<Ack>> {
        self.call(Method::DELETE, &format!("/api/friends/{id}/request"), None)
            .await
    }

    pub async fn remove_friend(&self, id: &RemoteId) -> Result<Reply<Ack>> {
        self.call(Method::DELETE, &format!("/api/friends/{id}"), None)
            .await
    }

    pub async fn search_users(&self, query: &str) -> Result<Reply<UserSearch>> {
        let mut url = self.endpoint("/api/users/search")?;
        url.query_pairs_mut().append_pair("q", query);
        self.call(Method::GET, &path_and_query(&url), None).await
    }

    pub async fn feed(&self, limit: usize, offset: usize) -> Result<Reply<FeedPage>> {
        let mut url = self.endpoint("/api/friends/feed")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.call(Method::GET, &path_and_query(&url), None).await
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

/// Classify a finished response: 401, error status, `success: false`, or a
/// body that does not match `T` all short-circuit before reconciliation.
async fn read_reply<T: DeserializeOwned>(response: Response, what: &str) -> Result<Reply<T>> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Ok(Reply::Unauthorized);
    }
    let text = response
        .text()
        .await
        .with_context(|| format!("read {what} response"))?;
    let value: Option<Value> = serde_json::from_str(&text).ok();

    if !status.is_success() {
        let detail = value
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| truncate_chars(text.trim(), 120));
        return Ok(Reply::Unusable(format!("{what} failed with {status}: {detail}")));
    }

    let Some(value) = value else {
        return Ok(Reply::Unusable(format!("{what} returned a non-JSON body")));
    };
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let detail = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("no reason given");
        return Ok(Reply::Unusable(format!("{what} rejected: {detail}")));
    }
    match serde_json::from_value::<T>(value) {
        Ok(body) => Ok(Reply::Body(body)),
        Err(err) => Ok(Reply::Unusable(format!("{what} returned an unexpected body: {err}"))),
    }
}

/// Media kind implied by a file extension, if it is one the backend accepts.
pub fn media_kind_for(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" => Some(MediaKind::Image),
        "mp4" | "webm" | "mov" => Some(MediaKind::Video),
        _ => None,
    }
}

fn mime_for(path: &Path, kind: MediaKind) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match (kind, ext.as_str()) {
        (MediaKind::Image, "png") => "image/png",
        (MediaKind::Image, "gif") => "image/gif",
        (MediaKind::Image, "webp") => "image/webp",
        (MediaKind::Image, _) => "image/jpeg",
        (MediaKind::Video, "webm") => "video/webm",
        (MediaKind::Video, "mov") => "video/quicktime",
        (MediaKind::Video, _) => "video/mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Canned, FakeBackend};

    fn client_for(backend: &FakeBackend) -> ApiClient {
        let config = ClientConfig {
            base_url: backend.base_url(),
            session: Some("s3cret".to_string()),
            ..ClientConfig::default()
        };
        ApiClient::new(&config, TabId::generate()).unwrap()
    }

    #[test]
    fn tab_ids_are_random_hex() {
        let a = TabId::generate();
        let b = TabId::generate();
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn events_url_carries_the_tab_id() {
        let config = ClientConfig {
            base_url: "localhost:5000".to_string(),
            ..ClientConfig::default()
        };
        let client = ApiClient::new(&config, TabId("abc123".to_string())).unwrap();
        assert_eq!(
            client.events_url().unwrap().as_str(),
            "http://localhost:5000/api/events?tabId=abc123"
        );
    }

    #[test]
    fn media_kind_follows_extension() {
        assert_eq!(media_kind_for(Path::new("a/cat.JPG")), Some(MediaKind::Image));
        assert_eq!(media_kind_for(Path::new("clip.webm")), Some(MediaKind::Video));
        assert_eq!(media_kind_for(Path::new("notes.txt")), None);
    }

    #[tokio::test]
    async fn requests_carry_identity_and_session() {
        let backend = FakeBackend::start(|_| {
            Canned::json(200, json!({"id": 42, "text": "Buy milk", "xp": 10}))
        });
        let client = client_for(&backend);

        let reply = client.create_task("Buy milk").await.unwrap();
        let Reply::Body(task) = reply else {
            panic!("expected a task body");
        };
        assert_eq!(task.id, RemoteId::from(42));

        let request = backend.last_request().unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "/api/tasks");
        assert_eq!(request.header(TAB_ID_HEADER), Some(client.tab_id().as_str()));
        assert_eq!(request.header("Cookie"), Some("session=s3cret"));
        assert_eq!(request.json()["text"], "Buy milk");
    }

    #[tokio::test]
    async fn unauthorized_is_a_distinct_signal() {
        let backend = FakeBackend::start(|_| Canned::json(401, json!({"error": "Unauthorized"})));
        let client = client_for(&backend);
        assert!(matches!(client.fetch_state().await.unwrap(), Reply::Unauthorized));
        assert!(matches!(client.subscribe().await.unwrap(), Reply::Unauthorized));
    }

    #[tokio::test]
    async fn unusable_bodies_are_no_ops() {
        let backend = FakeBackend::start(|request| match request.url.as_str() {
            "/api/tasks/7" => Canned::json(404, json!({"error": "Task not found"})),
            "/api/combo/reset" => Canned::json(200, json!({"success": false, "error": "nope"})),
            _ => Canned::text(200, "<html>oops</html>"),
        });
        let client = client_for(&backend);

        match client.delete_task(&RemoteId::from(7)).await.unwrap() {
            Reply::Unusable(reason) => assert!(reason.contains("Task not found")),
            other => panic!("unexpected {other:?}"),
        }
        match client.reset_combo().await.unwrap() {
            Reply::Unusable(reason) => assert!(reason.contains("nope")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(client.fetch_state().await.unwrap(), Reply::Unusable(_)));
    }

    #[tokio::test]
    async fn feed_and_search_encode_query_parameters() {
        let backend = FakeBackend::start(|request| {
            if request.url.starts_with("/api/friends/feed") {
                Canned::json(200, json!({"items": [], "has_more": false}))
            } else {
                Canned::json(200, json!({"users": [{"id": 3, "username": "ann lee"}]}))
            }
        });
        let client = client_for(&backend);

        client.feed(20, 40).await.unwrap();
        assert_eq!(backend.last_request().unwrap().url, "/api/friends/feed?limit=20&offset=40");

        let Reply::Body(found) = client.search_users("ann lee").await.unwrap() else {
            panic!("expected search results");
        };
        assert_eq!(found.users[0].username, "ann lee");
        assert_eq!(backend.last_request().unwrap().url, "/api/users/search?q=ann+lee");
    }

    #[tokio::test]
    async fn network_failure_is_an_error() {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..ClientConfig::default()
        };
        let client = ApiClient::new(&config, TabId::generate()).unwrap();
        assert!(client.fetch_state().await.is_err());
    }
}
