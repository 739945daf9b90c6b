//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the key-value store shared by every connection.
//! Values are either 64-bit integers or short text, and every entry may carry
//! an absolute expiry time.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: All entries live behind a single `RwLock`. The server only
//!    serves a handful of connections, so one synchronization domain is enough
//!    and keeps `INCR` a plain read-modify-write under one write guard.
//! 2. **Logical Expiry**: Reads compare `expires_at` against the clock and treat
//!    stale entries as absent. They never take the write lock.
//! 3. **Physical Expiry**: Only the background reaper (see `expiry.rs`) removes
//!    stale entries, through [`StorageEngine::cleanup_expired`].
//! 4. **Write-Time Typing**: `SET` decides between `Integer` and `Text` once,
//!    when the value is stored.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                StorageEngine                 │
//! │   RwLock<HashMap<String, Entry>>             │
//! │                                              │
//! │   readers: GET, LIST                         │
//! │   writers: SET, INCR, DEL, reaper sweep      │
//! └──────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Maximum length in bytes of a key or a raw value.
pub const MAX_TOKEN_LEN: usize = 100;

/// Errors returned by store operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Key or value exceeds [`MAX_TOKEN_LEN`] or contains a line break
    #[error("invalid length")]
    InvalidLength,

    /// The key is absent or already expired
    #[error("key not found")]
    KeyNotFound,

    /// `INCR` would move past `i64::MAX`
    #[error("increment would overflow")]
    Overflow,

    /// The TTL puts the expiry beyond what the clock can represent
    #[error("invalid expiration")]
    InvalidExpiration,
}

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Text(String),
}

impl Value {
    /// Picks the representation for a raw value at write time.
    pub fn from_raw(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => Value::Integer(n),
            Err(_) => Value::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<SystemTime>,
    /// Insertion sequence number, used to enumerate in insertion order
    seq: u64,
}

impl Entry {
    /// Checks if this entry has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }
}

/// One row of a [`StorageEngine::list`] snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub key: String,
    /// Textual form of the value
    pub value: String,
    /// Absolute expiry time, if any
    pub expires_at: Option<SystemTime>,
}

impl ListedEntry {
    /// Expiry as whole seconds since the Unix epoch.
    pub fn expires_at_unix(&self) -> Option<u64> {
        self.expires_at.map(|exp| {
            exp.duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }
}

/// Operation counters, see [`StorageEngine::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Entries physically present, including expired ones not yet reaped
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub incr_ops: u64,
    pub del_ops: u64,
    /// Entries removed by the reaper
    pub expired: u64,
}

/// The key-value store shared by all connection handlers and the reaper.
///
/// Wrap it in an `Arc` and hand clones to each task. Callers pass commands
/// in and get owned results back; no reference into the map ever escapes.
///
/// # Example
///
/// ```
/// use shrmpl_kv::storage::StorageEngine;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set("name", "shrimp", None).unwrap();
/// assert_eq!(engine.get("name"), Some("shrimp".to_string()));
///
/// assert_eq!(engine.incr("hits", None), Ok(1));
/// assert_eq!(engine.incr("hits", Some(Duration::from_secs(60))), Ok(2));
/// ```
pub struct StorageEngine {
    data: RwLock<HashMap<String, Entry>>,

    /// Next insertion sequence number
    next_seq: AtomicU64,

    get_count: AtomicU64,
    set_count: AtomicU64,
    incr_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            incr_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    // A panic while holding the guard cannot leave the map half-written:
    // every mutation is a single insert or remove.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Gets the textual value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. Expired entries
    /// are left in place for the reaper.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let data = self.read();
        data.get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.to_string())
    }

    /// Stores `raw_value` under `key`.
    ///
    /// The value is stored as an integer when it parses as one. A `ttl` sets
    /// the expiry relative to now; without one any previous expiry is cleared.
    /// A live key keeps its enumeration position when overwritten.
    pub fn set(&self, key: &str, raw_value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        validate(key)?;
        validate(raw_value)?;
        let now = SystemTime::now();
        let expires_at = expiry_from(now, ttl)?;
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let entry_value = Value::from_raw(raw_value);

        let mut data = self.write();
        match data.get_mut(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.value = entry_value;
                entry.expires_at = expires_at;
            }
            _ => {
                let seq = self.next_seq();
                data.insert(
                    key.to_string(),
                    Entry {
                        value: entry_value,
                        expires_at,
                        seq,
                    },
                );
            }
        }

        Ok(())
    }

    /// Increments an integer value by 1 and returns the result.
    ///
    /// Absent, expired and non-integer entries count as 0. A `ttl` replaces
    /// the expiry; without one a live entry keeps its expiry and a fresh key
    /// gets none.
    pub fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError> {
        validate(key)?;
        let now = SystemTime::now();
        let new_expiry = expiry_from(now, ttl)?;
        self.incr_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.write();
        match data.get_mut(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                let current = match entry.value {
                    Value::Integer(n) => n,
                    Value::Text(_) => 0,
                };
                let next = current.checked_add(1).ok_or(StoreError::Overflow)?;
                entry.value = Value::Integer(next);
                if new_expiry.is_some() {
                    entry.expires_at = new_expiry;
                }
                Ok(next)
            }
            _ => {
                let seq = self.next_seq();
                data.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Integer(1),
                        expires_at: new_expiry,
                        seq,
                    },
                );
                Ok(1)
            }
        }
    }

    /// Deletes a live key.
    ///
    /// Fails with [`StoreError::KeyNotFound`] if the key is absent or expired.
    /// An expired entry found here is dropped as well.
    pub fn del(&self, key: &str) -> Result<(), StoreError> {
        validate(key)?;
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.write();
        match data.remove(key) {
            Some(entry) if !entry.is_expired() => Ok(()),
            Some(_) => {
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                Err(StoreError::KeyNotFound)
            }
            None => Err(StoreError::KeyNotFound),
        }
    }

    /// Snapshot of all live entries in insertion order.
    pub fn list(&self) -> Vec<ListedEntry> {
        let now = SystemTime::now();
        let data = self.read();

        let mut live: Vec<(u64, ListedEntry)> = data
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| {
                (
                    entry.seq,
                    ListedEntry {
                        key: key.clone(),
                        value: entry.value.to_string(),
                        expires_at: entry.expires_at,
                    },
                )
            })
            .collect();
        drop(data);

        live.sort_unstable_by_key(|(seq, _)| *seq);
        live.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Removes every expired entry and returns how many were removed.
    ///
    /// This is called by the background reaper.
    pub fn cleanup_expired(&self) -> u64 {
        let now = SystemTime::now();
        let mut data = self.write();
        let before = data.len();

        data.retain(|_, entry| !entry.is_expired_at(now));

        let removed = (before - data.len()) as u64;
        if removed > 0 {
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Number of entries physically present, expired ones included.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no entries are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns operation counters.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            incr_ops: self.incr_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Absolute expiry for a TTL counted from `now`.
fn expiry_from(now: SystemTime, ttl: Option<Duration>) -> Result<Option<SystemTime>, StoreError> {
    ttl.map(|ttl| now.checked_add(ttl).ok_or(StoreError::InvalidExpiration))
        .transpose()
}

/// Rejects keys and values that are too long or would break line framing.
pub fn validate(token: &str) -> Result<(), StoreError> {
    if token.len() > MAX_TOKEN_LEN || token.contains(['\n', '\r']) {
        return Err(StoreError::InvalidLength);
    }
    Ok(())
}
