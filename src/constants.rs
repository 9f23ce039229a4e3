//! Compile-time constants and tunables shared across the crate.

/// Application name used for config and data directories.
pub const APP_NAME: &str = "questline";
/// Application version injected from `Cargo.toml` at compile time.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backend used when neither the config file nor the environment names one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
/// Cookie that carries the authenticated backend session.
pub const DEFAULT_SESSION_COOKIE: &str = "session";
/// Config file looked up in the working directory and the config dir.
pub const CONFIG_FILE_NAME: &str = "questline.json";

/// Header that tags every outbound request with the push identity.
pub const TAB_ID_HEADER: &str = "X-Tab-Id";
/// Query parameter that tags the push subscription with the push identity.
pub const TAB_ID_PARAM: &str = "tabId";

/// Maximum number of log entries kept in the activity panel.
pub const MAX_LOGS: usize = 1000;

// ── Sync timings (milliseconds) ──────────────────────────────────────

/// Idle window after a completion before the combo decays.
pub const COMBO_TIMEOUT_MS: u64 = 5000;
/// Quiet period before a text edit is sent.
pub const EDIT_DEBOUNCE_MS: u64 = 300;
/// How long a completed quest lingers before leaving the list.
pub const COMPLETE_ANIMATION_MS: u64 = 600;
/// How long a deleted quest lingers before leaving the list.
pub const DELETE_ANIMATION_MS: u64 = 300;
/// First reconnect delay; doubles on every consecutive failure.
pub const RECONNECT_BASE_DELAY_MS: u64 = 3000;
/// Consecutive reconnect attempts before the push channel gives up.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;
/// Fallback full-state reload period while the push channel is down.
pub const PERIODIC_REFRESH_MS: u64 = 60_000;

/// Friend feed page size.
pub const FEED_PAGE_SIZE: usize = 20;

// ── Local history ledger ─────────────────────────────────────────────

/// File name of the persisted XP history ledger.
pub const HISTORY_FILE_NAME: &str = "history.json";
/// Number of most-recent entries kept in the ledger.
pub const HISTORY_CAP: usize = 50;
