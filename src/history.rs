//! Local XP history ledger: the 50 most recent XP-earning events, newest
//! first, persisted as JSON outside the backend session. Purely an audit
//! trail: losing it is harmless, so I/O failures are reported, never fatal.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::config::data_dir_file;
use crate::constants::{HISTORY_CAP, HISTORY_FILE_NAME};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HistoryEntry {
    pub action: String,
    pub points: u32,
    #[serde(default)]
    pub icon: Option<String>,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl HistoryEntry {
    pub fn now(action: impl Into<String>, points: u32, icon: Option<&str>) -> Self {
        HistoryEntry {
            action: action.into(),
            points,
            icon: icon.map(str::to_string),
            timestamp: Local::now().timestamp_millis(),
        }
    }

    pub fn when(&self) -> String {
        Local
            .timestamp_millis_opt(self.timestamp)
            .single()
            .map(|at| at.format("%d.%m %H:%M").to_string())
            .unwrap_or_else(|| "--.-- --:--".to_string())
    }
}

#[derive(Debug, Default)]
pub struct HistoryLedger {
    entries: VecDeque<HistoryEntry>,
    path: Option<PathBuf>,
}

impl HistoryLedger {
    /// Ledger at the fixed location in the platform data dir.
    pub fn open_default() -> Result<Self> {
        match data_dir_file(HISTORY_FILE_NAME) {
            Some(path) => Self::open(path),
            None => Ok(Self::in_memory()),
        }
    }

    /// Ledger that is never written to disk.
    pub fn in_memory() -> Self {
        HistoryLedger::default()
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read history from {}", path.display()))?;
            let mut entries: VecDeque<HistoryEntry> = serde_json::from_str(&contents)
                .with_context(|| format!("parse history from {}", path.display()))?;
            entries.truncate(HISTORY_CAP);
            entries
        } else {
            VecDeque::new()
        };
        Ok(HistoryLedger {
            entries,
            path: Some(path),
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Prepend an entry, drop the oldest beyond the cap, and persist.
    pub fn record(&mut self, entry: HistoryEntry) -> Result<()> {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_CAP);
        self.save()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create history dir {}", parent.display()))?;
        }
        let payload = serde_json::to_string_pretty(&self.entries).context("serialize history")?;
        fs::write(path, payload).with_context(|| format!("write history to {}", path.display()))
    }
}
