// src/session/store.rs

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::{error::AppError, models::violation::SecurityState};

/// Synchronous string key-value store scoped to one client instance.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// In-memory store. Clones share the same map, which lets a test drop a
/// session and build a new one over the same data to simulate a reload.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Storage("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// One file per key inside a directory.
///
/// Writes go to a temporary file first and are renamed into place, so an abrupt
/// exit leaves either the old or the new snapshot, never a torn one.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, AppError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn security_key(attempt_id: &str) -> String {
    format!("quiz_security_{}", attempt_id)
}

fn deadline_key(attempt_id: &str) -> String {
    format!("quiz_deadline_{}", attempt_id)
}

/// Durable snapshots of one attempt's security state and deadline.
pub struct SessionStore {
    kv: Box<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Box<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Idempotent overwrite; called after every mutation.
    pub fn save(&self, attempt_id: &str, state: &SecurityState) -> Result<(), AppError> {
        let json = serde_json::to_string(state)?;
        self.kv.set(&security_key(attempt_id), &json)
    }

    /// An unreadable snapshot is discarded rather than failing the load.
    pub fn restore(&self, attempt_id: &str) -> Result<Option<SecurityState>, AppError> {
        let Some(raw) = self.kv.get(&security_key(attempt_id))? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!("Discarding unreadable security snapshot for {}: {}", attempt_id, e);
                Ok(None)
            }
        }
    }

    pub fn save_deadline(&self, attempt_id: &str, ends_at: DateTime<Utc>) -> Result<(), AppError> {
        self.kv.set(&deadline_key(attempt_id), &ends_at.to_rfc3339())
    }

    pub fn restore_deadline(&self, attempt_id: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        let Some(raw) = self.kv.get(&deadline_key(attempt_id))? else {
            return Ok(None);
        };

        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(ends_at) => Ok(Some(ends_at.with_timezone(&Utc))),
            Err(e) => {
                tracing::warn!("Discarding unreadable deadline for {}: {}", attempt_id, e);
                Ok(None)
            }
        }
    }

    /// Called once the grading service has acknowledged a submission.
    pub fn clear(&self, attempt_id: &str) -> Result<(), AppError> {
        self.kv.remove(&security_key(attempt_id))?;
        self.kv.remove(&deadline_key(attempt_id))
    }
}
