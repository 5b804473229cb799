//! Access Rule Set
//!
//! The allow-list and deny-list: deduplicated collections of
//! `{key, activate_at}` entries. Entries become active purely by time
//! passing; the engine's mutation store handles scheduling, cancellation,
//! and promotion events around them.

use std::collections::HashMap;

use crate::host::is_suffix_match;
use crate::types::{AccessEntry, ListKind, PolicyError};

/// The two rule lists, keyed by normalized entry key.
///
/// Invariant: at most one entry per key per list. When a duplicate add
/// occurs, the entry with the earlier activation wins; an already
/// scheduled or active entry is never re-delayed.
#[derive(Debug, Default)]
pub struct AccessRuleSet {
    allow: HashMap<String, AccessEntry>,
    deny: HashMap<String, AccessEntry>,
}

impl AccessRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, kind: ListKind) -> &HashMap<String, AccessEntry> {
        match kind {
            ListKind::Allow => &self.allow,
            ListKind::Deny => &self.deny,
        }
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut HashMap<String, AccessEntry> {
        match kind {
            ListKind::Allow => &mut self.allow,
            ListKind::Deny => &mut self.deny,
        }
    }

    /// Normalize a raw deny-list term: trimmed, lowercased, non-empty.
    pub fn normalize_term(raw: &str) -> Result<String, PolicyError> {
        let term = raw.trim().to_lowercase();
        if term.is_empty() {
            return Err(PolicyError::InvalidInput(raw.to_string()));
        }
        Ok(term)
    }

    /// Insert an entry, keeping the earlier activation on duplicates.
    /// Returns the entry now stored for the key.
    pub fn upsert_earliest(&mut self, kind: ListKind, entry: AccessEntry) -> &AccessEntry {
        let list = self.list_mut(kind);
        let slot = list
            .entry(entry.key.clone())
            .or_insert_with(|| entry.clone());
        if entry.activate_at < slot.activate_at {
            slot.activate_at = entry.activate_at;
        }
        slot
    }

    pub fn get(&self, kind: ListKind, key: &str) -> Option<&AccessEntry> {
        self.list(kind).get(key)
    }

    /// Remove an entry outright. Used for explicit removal by the
    /// collaborator and for cancelling a still-pending add.
    pub fn remove(&mut self, kind: ListKind, key: &str) -> bool {
        self.list_mut(kind).remove(key).is_some()
    }

    /// True iff any active entry suffix-matches the candidate key.
    pub fn evaluate(&self, kind: ListKind, candidate: &str, now: u64) -> bool {
        self.list(kind)
            .values()
            .any(|e| e.is_active(now) && is_suffix_match(candidate, &e.key))
    }

    /// A pending (scheduled, not yet active) entry covering the candidate.
    pub fn pending_match(&self, kind: ListKind, candidate: &str, now: u64) -> Option<&AccessEntry> {
        self.list(kind)
            .values()
            .find(|e| !e.is_active(now) && is_suffix_match(candidate, &e.key))
    }

    /// Keys of entries active at `now`.
    pub fn active_keys(&self, kind: ListKind, now: u64) -> impl Iterator<Item = &str> {
        self.list(kind)
            .values()
            .filter(move |e| e.is_active(now))
            .map(|e| e.key.as_str())
    }

    /// All entries of a list, unordered. Used when persisting.
    pub fn entries(&self, kind: ListKind) -> impl Iterator<Item = &AccessEntry> {
        self.list(kind).values()
    }

    /// Drop every entry of a list.
    pub fn clear(&mut self, kind: ListKind) {
        self.list_mut(kind).clear();
    }

    pub fn len(&self, kind: ListKind) -> usize {
        self.list(kind).len()
    }

    pub fn is_empty(&self, kind: ListKind) -> bool {
        self.list(kind).is_empty()
    }
}
