//! Storage Engine Module
//!
//! This module holds all key/value state for the server: a single
//! lock-guarded map with TTL support, and the background reaper that
//! reclaims expired entries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                StorageEngine                │
//! │      RwLock<HashMap<String, Entry>>         │
//! └─────────────────────────────────────────────┘
//!                        ▲
//!                        │ cleanup_expired()
//!          ┌─────────────┴─────────────┐
//!          │      ExpirySweeper        │
//!          │  (Background Tokio Task)  │
//!          └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use shrmpl_kv::storage::StorageEngine;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set("session", "token123", Some(Duration::from_secs(3600))).unwrap();
//! assert_eq!(engine.get("session"), Some("token123".to_string()));
//!
//! assert!(engine.del("session").is_ok());
//! assert!(engine.del("session").is_err());
//! ```

pub mod engine;
pub mod expiry;

// Re-export commonly used types
pub use engine::{
    Entry, ListedEntry, StorageEngine, StorageStats, StoreError, Value, MAX_TOKEN_LEN,
};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, DEFAULT_REAPER_INTERVAL};
