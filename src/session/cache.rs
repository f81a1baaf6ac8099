// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local key-value storage and the offline session cache.
//!
//! The cache is read-through only: it is written from service-confirmed
//! sessions and invalidated on sign-out or failed recovery. It is never a
//! second source of truth for the live session.

use crate::models::Session;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Browser-style string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Vec<String>;
}

/// Process-lifetime storage (the session-storage analogue).
#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

/// JSON-file backed storage that survives restarts (the local-storage
/// analogue). The whole map is rewritten on every change.
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> T) -> T {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
            self.flush(entries)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entries(|entries| {
            if entries.remove(key).is_some() {
                self.flush(entries)?;
            }
            Ok(())
        })
    }

    fn keys(&self) -> Vec<String> {
        self.with_entries(|entries| entries.keys().cloned().collect())
    }
}

/// Whether a storage key belongs to the auth layer.
pub fn is_auth_key(key: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| key.contains(p.as_str()))
}

/// Remove every key containing one of `patterns`. Failures are logged and
/// skipped. Returns the keys actually removed.
pub fn purge_matching(storage: &dyn KeyValueStore, patterns: &[String]) -> Vec<String> {
    let mut removed = Vec::new();
    for key in storage.keys() {
        if !is_auth_key(&key, patterns) {
            continue;
        }
        match storage.remove(&key) {
            Ok(()) => removed.push(key),
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to remove storage key"),
        }
    }
    removed
}

/// Offline copy of the last service-confirmed session.
pub struct SessionCache {
    storage: std::sync::Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionCache {
    pub fn new(storage: std::sync::Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Read the cached session. A corrupt entry is removed.
    pub fn load(&self) -> Option<Session> {
        let raw = self.storage.get(&self.key)?;
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable cached session");
                self.invalidate();
                None
            }
        }
    }

    /// Write through a service-confirmed session.
    pub fn store(&self, session: &Session) {
        let result = serde_json::to_string(session)
            .map_err(StorageError::from)
            .and_then(|raw| self.storage.set(&self.key, &raw));
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to cache session");
        }
    }

    pub fn invalidate(&self) {
        if let Err(e) = self.storage.remove(&self.key) {
            tracing::warn!(error = %e, "Failed to invalidate cached session");
        }
    }
}
