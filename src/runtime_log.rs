use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeLogEntry {
    pub timestamp_unix_ms: u128,
    pub level: String,
    pub event: String,
    pub message: String,
}

pub fn default_log_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("speech-capture").join("runtime.log")
}

pub fn append(path: &Path, level: &str, event: &str, message: &str) -> Result<(), StoreError> {
    let parent = path.parent().ok_or(StoreError::NoParent("log"))?;
    fs::create_dir_all(parent)?;

    let timestamp_unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| StoreError::Clock)?
        .as_millis();

    let line = serde_json::to_string(&RuntimeLogEntry {
        timestamp_unix_ms,
        level: level.to_string(),
        event: event.to_string(),
        message: message.to_string(),
    })?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<String>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = fs::read_to_string(path)?;
    let lines = contents.lines().collect::<Vec<_>>();
    let take = lines.len().min(limit);
    Ok(lines[lines.len() - take..]
        .iter()
        .map(|line| (*line).to_string())
        .collect())
}

pub fn clear(path: &Path) -> Result<(), StoreError> {
    if !path.exists() {
        return Ok(());
    }
    fs::remove_file(path)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RuntimeJournal {
    path: Option<PathBuf>,
}

impl RuntimeJournal {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, level: &str, event: &str, message: &str) {
        if let Some(path) = &self.path {
            if let Err(error) = append(path, level, event, message) {
                log::warn!("failed to append runtime log entry {event}: {error}");
            }
        }
    }
}
