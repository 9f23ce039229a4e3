//! Client configuration: backend location, session credentials, and timings.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::constants::{
    APP_NAME, COMBO_TIMEOUT_MS, COMPLETE_ANIMATION_MS, CONFIG_FILE_NAME, DEFAULT_BASE_URL,
    DEFAULT_SESSION_COOKIE, DELETE_ANIMATION_MS, EDIT_DEBOUNCE_MS, FEED_PAGE_SIZE,
    PERIODIC_REFRESH_MS, RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_ATTEMPTS,
};
use crate::util::{env_first, normalize_url};

/// Everything the sync core needs to reach the backend.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Value of the authenticated session cookie.
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub timings: Timings,
}

/// Local timer lengths, in milliseconds.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Timings {
    pub combo_timeout_ms: u64,
    pub edit_debounce_ms: u64,
    pub complete_animation_ms: u64,
    pub delete_animation_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_attempts: u32,
    pub periodic_refresh_ms: u64,
    pub feed_page_size: usize,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            combo_timeout_ms: COMBO_TIMEOUT_MS,
            edit_debounce_ms: EDIT_DEBOUNCE_MS,
            complete_animation_ms: COMPLETE_ANIMATION_MS,
            delete_animation_ms: DELETE_ANIMATION_MS,
            reconnect_base_delay_ms: RECONNECT_BASE_DELAY_MS,
            reconnect_max_attempts: RECONNECT_MAX_ATTEMPTS,
            periodic_refresh_ms: PERIODIC_REFRESH_MS,
            feed_page_size: FEED_PAGE_SIZE,
        }
    }
}

impl Timings {
    pub fn combo_timeout(&self) -> Duration {
        Duration::from_millis(self.combo_timeout_ms)
    }

    pub fn edit_debounce(&self) -> Duration {
        Duration::from_millis(self.edit_debounce_ms)
    }

    pub fn complete_animation(&self) -> Duration {
        Duration::from_millis(self.complete_animation_ms)
    }

    pub fn delete_animation(&self) -> Duration {
        Duration::from_millis(self.delete_animation_ms)
    }

    pub fn periodic_refresh(&self) -> Duration {
        Duration::from_millis(self.periodic_refresh_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: default_base_url(),
            session: None,
            cookie_name: default_cookie_name(),
            timings: Timings::default(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_cookie_name() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

/// Where the client configuration was loaded from.
#[derive(Clone, Debug)]
pub enum ConfigSource {
    Defaults,
    File(PathBuf),
}

impl ConfigSource {
    pub fn label(&self) -> String {
        match self {
            ConfigSource::Defaults => "built-in defaults".to_string(),
            ConfigSource::File(path) => path.display().to_string(),
        }
    }
}

impl ClientConfig {
    /// Load the config file (if any), then apply environment overrides.
    pub fn load() -> Result<(Self, ConfigSource)> {
        let (mut config, source) = Self::load_file()?;
        config.apply_env();
        config.base_url = normalize_url(&config.base_url);
        Ok((config, source))
    }

    fn load_file() -> Result<(Self, ConfigSource)> {
        if let Ok(path) = env::var("QUESTLINE_CONFIG") {
            let path = PathBuf::from(path);
            return Ok((Self::load_from_path(&path)?, ConfigSource::File(path)));
        }

        let cwd_path = PathBuf::from(CONFIG_FILE_NAME);
        if cwd_path.exists() {
            return Ok((Self::load_from_path(&cwd_path)?, ConfigSource::File(cwd_path)));
        }

        if let Some(config_path) = config_dir_file(CONFIG_FILE_NAME) {
            if config_path.exists() {
                return Ok((
                    Self::load_from_path(&config_path)?,
                    ConfigSource::File(config_path),
                ));
            }
        }

        Ok((ClientConfig::default(), ConfigSource::Defaults))
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read client config from {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("parse client config from {}", path.display()))
    }

    fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    fn apply_env(&mut self) {
        if let Some(url) = env_first(&["QUESTLINE_URL", "API_URL"]) {
            self.base_url = url;
        }
        if let Some(session) = env_first(&["QUESTLINE_SESSION"]) {
            self.session = Some(session.trim().to_string());
        }
        if let Some(name) = env_first(&["QUESTLINE_COOKIE_NAME"]) {
            self.cookie_name = name.trim().to_string();
        }
    }
}

/// Path of `filename` inside the platform config directory.
pub fn config_dir_file(filename: &str) -> Option<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", APP_NAME, APP_NAME)?;
    Some(proj_dirs.config_dir().join(filename))
}

/// Path of `filename` inside the platform data directory.
pub fn data_dir_file(filename: &str) -> Option<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", APP_NAME, APP_NAME)?;
    Some(proj_dirs.data_dir().join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_default_timings() {
        let config = ClientConfig::parse(
            r#"{"base_url": "https://todo.example.org", "timings": {"combo_timeout_ms": 1200}}"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://todo.example.org");
        assert_eq!(config.cookie_name, DEFAULT_SESSION_COOKIE);
        assert_eq!(config.timings.combo_timeout_ms, 1200);
        assert_eq!(config.timings.edit_debounce_ms, EDIT_DEBOUNCE_MS);
        assert_eq!(config.timings.reconnect_max_attempts, RECONNECT_MAX_ATTEMPTS);
    }

    #[test]
    fn empty_object_is_all_defaults() {
        let config = ClientConfig::parse("{}").unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.session.is_none());
        assert_eq!(config.timings.periodic_refresh(), Duration::from_secs(60));
    }
}
