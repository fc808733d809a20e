//! Keyed settings store
//!
//! A small persisted key/value store namespaced under a fixed prefix.
//! Plain `get`/`set`/`remove` overwrite without tracking time. The two
//! update operations track an expiration per key:
//!
//! - [`KeyedStore::update_dictionary`] merges a dictionary and returns only
//!   what changed, or the whole dictionary once the entry has expired.
//! - [`KeyedStore::update_object`] does the same for a single value and
//!   reports whether it changed.
//!
//! An update that changes nothing leaves the expiration untouched, so a
//! caller can tell "no change" from "changed".
//!
//! The read-modify-write of each call runs under the store's lock, but a
//! caller combining several calls must serialize them itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::SettingsError;

/// A stored value and its bookkeeping, as persisted on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredEntry {
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stored_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn plain(value: Value) -> Self {
        Self {
            value,
            stored_at: None,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Public view of a stored entry
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedEntry {
    pub key: String,
    pub value: Value,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Persisted, prefix-namespaced key/value store
pub struct KeyedStore {
    prefix: String,
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, StoredEntry>>,
    clock: Arc<dyn Clock>,
}

impl KeyedStore {
    /// Opens the store backed by `path`, loading existing entries.
    ///
    /// A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>, prefix: &str) -> Result<Self, SettingsError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), count = entries.len(), "Opened settings store");

        Ok(Self {
            prefix: prefix.to_string(),
            path: Some(path),
            entries: Mutex::new(entries),
            clock: Arc::new(SystemClock),
        })
    }

    /// Opens the store at `path`, starting empty if the file is unreadable.
    ///
    /// The file is overwritten on the next write.
    pub fn open_or_empty(path: impl Into<PathBuf>, prefix: &str) -> Self {
        let path = path.into();
        match Self::open(&path, prefix) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Settings unreadable, starting empty");
                Self {
                    prefix: prefix.to_string(),
                    path: Some(path),
                    entries: Mutex::new(BTreeMap::new()),
                    clock: Arc::new(SystemClock),
                }
            }
        }
    }

    /// Creates a store that is never written to disk
    pub fn in_memory(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            path: None,
            entries: Mutex::new(BTreeMap::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for expiration
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}.{}", self.prefix, key)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, StoredEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Plain access
    // ========================================================================

    /// Returns the value stored under `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(&self.full_key(key)).map(|e| e.value.clone())
    }

    /// Returns the value under `key` deserialized as `T`
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Returns the value under `key` with its expiration
    pub fn entry(&self, key: &str) -> Option<KeyedEntry> {
        self.lock().get(&self.full_key(key)).map(|e| KeyedEntry {
            key: key.to_string(),
            value: e.value.clone(),
            expires_at: e.expires_at,
        })
    }

    /// Stores `value` under `key`, dropping any expiration
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let mut entries = self.lock();
        entries.insert(self.full_key(key), StoredEntry::plain(value.into()));
        self.persist_logged(&entries);
    }

    /// Removes `key`; removing an absent key is a no-op
    pub fn remove(&self, key: &str) {
        let mut entries = self.lock();
        if entries.remove(&self.full_key(key)).is_some() {
            self.persist_logged(&entries);
        }
    }

    // ========================================================================
    // Migration
    // ========================================================================

    /// Moves legacy values to namespaced keys.
    ///
    /// `pairs` maps a legacy (unprefixed) key to its new key. A value is
    /// copied then the legacy key deleted, only when the legacy key exists
    /// and the new key does not. Returns the number of keys migrated.
    pub fn migrate_keys(&self, pairs: &[(&str, &str)], service_name: &str) -> usize {
        let mut entries = self.lock();
        let mut migrated = 0;

        for (old_key, new_key) in pairs {
            let new_full = self.full_key(new_key);
            if entries.contains_key(&new_full) {
                continue;
            }
            if let Some(entry) = entries.remove(*old_key) {
                debug!(service = service_name, old_key, new_key, "Migrating settings key");
                entries.insert(new_full, entry);
                migrated += 1;
            }
        }

        if migrated > 0 {
            info!(service = service_name, count = migrated, "Migrated settings keys");
            self.persist_logged(&entries);
        }
        migrated
    }

    // ========================================================================
    // Updates with expiration
    // ========================================================================

    /// Merges `values` into the dictionary under `key`, returning what changed.
    ///
    /// If there is no usable prior dictionary, or it has expired, the whole
    /// dictionary is replaced, the expiration restarts, and `values` is
    /// returned in full. Otherwise only changed or added keys are applied and
    /// returned. An empty diff does not restart the expiration.
    pub fn update_dictionary(
        &self,
        values: Map<String, Value>,
        key: &str,
        ttl: Option<Duration>,
    ) -> Map<String, Value> {
        let now = self.clock.now();
        let full_key = self.full_key(key);
        let mut entries = self.lock();

        let current = entries
            .get(&full_key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.value.as_object().cloned());

        let Some(mut merged) = current else {
            debug!(key, count = values.len(), "Replacing settings dictionary");
            entries.insert(
                full_key,
                StoredEntry {
                    value: Value::Object(values.clone()),
                    stored_at: Some(now),
                    expires_at: expiry(now, ttl),
                },
            );
            self.persist_logged(&entries);
            return values;
        };

        let mut diff = Map::new();
        for (k, v) in values {
            if merged.get(&k) != Some(&v) {
                merged.insert(k.clone(), v.clone());
                diff.insert(k, v);
            }
        }

        if !diff.is_empty() {
            debug!(key, count = diff.len(), "Merged settings dictionary");
            entries.insert(
                full_key,
                StoredEntry {
                    value: Value::Object(merged),
                    stored_at: Some(now),
                    expires_at: expiry(now, ttl),
                },
            );
            self.persist_logged(&entries);
        }
        diff
    }

    /// Stores `value` under `key`, returning true if it changed.
    ///
    /// An expired or absent entry always counts as changed.
    pub fn update_object(&self, value: impl Into<Value>, key: &str, ttl: Option<Duration>) -> bool {
        let value = value.into();
        let now = self.clock.now();
        let full_key = self.full_key(key);
        let mut entries = self.lock();

        let unchanged = entries
            .get(&full_key)
            .is_some_and(|e| !e.is_expired(now) && e.value == value);
        if unchanged {
            return false;
        }

        entries.insert(
            full_key,
            StoredEntry {
                value,
                stored_at: Some(now),
                expires_at: expiry(now, ttl),
            },
        );
        self.persist_logged(&entries);
        true
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Writes every entry to the backing file
    pub fn flush(&self) -> Result<(), SettingsError> {
        let entries = self.lock();
        self.persist(&entries)
    }

    fn persist_logged(&self, entries: &BTreeMap<String, StoredEntry>) {
        if let Err(e) = self.persist(entries) {
            warn!(error = %e, "Failed to persist settings");
        }
    }

    // Write to a sibling temporary file then rename, so readers never see
    // a partially written file.
    fn persist(&self, entries: &BTreeMap<String, StoredEntry>) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        let json = serde_json::to_vec_pretty(entries)?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

// A TTL too large to represent never expires.
fn expiry(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl?).ok()?;
    now.checked_add_signed(ttl)
}
