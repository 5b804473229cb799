//! Storage backend contract
//!
//! The persistence collaborator the core consumes. A `false` from `set` or
//! `remove` signals a non-fatal write failure: the in-memory state has
//! already moved on and remains the source of truth for the session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

/// Key-value persistence consumed by the store.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    /// Returns false on a non-fatal write failure.
    async fn set(&self, key: &str, value: &str) -> bool;
    async fn remove(&self, key: &str) -> bool;
}

/// In-memory backend for tests and ephemeral sessions. Writes can be made
/// to fail on demand to exercise failure reporting.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key, e.g. to simulate state from a prior session.
    pub fn seed(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .expect("backend lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    /// Make subsequent writes report failure.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Direct read for assertions.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("backend lock poisoned")
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("backend lock poisoned")
            .get(key)
            .cloned()
    }

    async fn set(&self, key: &str, value: &str) -> bool {
        if self.fail_writes.load(Ordering::SeqCst) {
            return false;
        }
        self.entries
            .lock()
            .expect("backend lock poisoned")
            .insert(key.to_string(), value.to_string());
        true
    }

    async fn remove(&self, key: &str) -> bool {
        if self.fail_writes.load(Ordering::SeqCst) {
            return false;
        }
        self.entries
            .lock()
            .expect("backend lock poisoned")
            .remove(key);
        true
    }
}
