//! Scheduled Mutation Store
//!
//! A generic "pending value activates at T" record store, keyed by field
//! identifier. Every delayed mutation in the engine (list entry adds, the
//! delay field, configuration fields) goes through this one mechanism
//! instead of carrying its own countdown logic.
//!
//! At most one pending record exists per field at any time. Scheduling a
//! new mutation for a field overwrites any prior pending record
//! (last-requested-wins); it does not stack. Promotion removes the record,
//! so promotion and cancellation compete for it and whichever runs first
//! wins.

use std::collections::HashMap;

use log::debug;

use crate::types::{FieldValue, PendingField, PromotionEvent, ScheduleResult};

/// Milliseconds per minute of configured delay.
pub const MS_PER_MINUTE: u64 = 60_000;

// =============================================================================
// Commit Policies
// =============================================================================

/// The rule deciding whether a requested change applies immediately or is
/// deferred, and by how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Zero effective delay applies immediately; anything else defers by
    /// the effective delay. Used for list entries and configuration
    /// fields.
    SymmetricDefer,
    /// Tightening never waits: a requested delay at or above the current
    /// effective delay applies immediately. A shorter delay only takes
    /// hold after the current effective delay has been served out.
    /// Used only for the delay-duration field itself.
    EscalateImmediately,
}

// =============================================================================
// Store
// =============================================================================

/// The scheduled mutation store.
#[derive(Debug, Default)]
pub struct MutationStore {
    pending: HashMap<String, PendingField>,
}

impl MutationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a mutation for `field_id` under the given policy.
    ///
    /// `Immediate` means the caller must apply `value` now; any pending
    /// record for the field has been cleared. `Deferred` means a pending
    /// record now exists (replacing any prior one) and will promote at the
    /// returned time.
    pub fn schedule(
        &mut self,
        field_id: &str,
        value: FieldValue,
        effective_delay_minutes: u64,
        policy: CommitPolicy,
        now: u64,
    ) -> ScheduleResult {
        let defer_minutes = match policy {
            CommitPolicy::SymmetricDefer => {
                if effective_delay_minutes == 0 {
                    self.pending.remove(field_id);
                    return ScheduleResult::Immediate;
                }
                effective_delay_minutes
            }
            CommitPolicy::EscalateImmediately => {
                let requested = value.as_minutes().unwrap_or(0);
                if requested >= effective_delay_minutes {
                    self.pending.remove(field_id);
                    return ScheduleResult::Immediate;
                }
                // Serve out the existing cool-down before a shorter one
                // takes hold.
                effective_delay_minutes
            }
        };

        let activate_at = now + defer_minutes * MS_PER_MINUTE;
        debug!("scheduling {field_id} for {activate_at}");
        self.pending.insert(
            field_id.to_string(),
            PendingField {
                field_id: field_id.to_string(),
                value,
                activate_at,
            },
        );
        ScheduleResult::Deferred { activate_at }
    }

    /// Remove every pending record whose field id starts with `prefix`.
    /// Returns how many were removed.
    pub fn cancel_prefix(&mut self, prefix: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|id, _| !id.starts_with(prefix));
        before - self.pending.len()
    }

    /// Remove the pending record for a field. Returns true if one existed.
    pub fn cancel(&mut self, field_id: &str) -> bool {
        let existed = self.pending.remove(field_id).is_some();
        if existed {
            debug!("cancelled pending change for {field_id}");
        }
        existed
    }

    /// Promote the field's pending record if it is due.
    ///
    /// Idempotent: once promoted (or if no record exists), further calls
    /// return `None`.
    pub fn promote_if_due(&mut self, field_id: &str, now: u64) -> Option<PromotionEvent> {
        let due = self
            .pending
            .get(field_id)
            .is_some_and(|p| now >= p.activate_at);
        if !due {
            return None;
        }
        let record = self.pending.remove(field_id)?;
        debug!("promoting {field_id}");
        Some(PromotionEvent {
            field_id: record.field_id,
            value: record.value,
        })
    }

    /// The pending record for a field, if any and not yet due.
    ///
    /// An expired-but-unpromoted record is reported as `None`; the caller
    /// must promote first.
    pub fn get_pending(&self, field_id: &str, now: u64) -> Option<&PendingField> {
        self.pending
            .get(field_id)
            .filter(|p| now < p.activate_at)
    }

    /// The pending record regardless of due state. Used when persisting.
    pub fn get_raw(&self, field_id: &str) -> Option<&PendingField> {
        self.pending.get(field_id)
    }

    /// Restore a pending record verbatim, e.g. from persisted state.
    pub fn restore(&mut self, record: PendingField) {
        self.pending.insert(record.field_id.clone(), record);
    }

    /// Field ids whose records are due at `now`, in activation order.
    pub fn due_field_ids(&self, now: u64) -> Vec<String> {
        let mut due: Vec<&PendingField> = self
            .pending
            .values()
            .filter(|p| now >= p.activate_at)
            .collect();
        due.sort_by_key(|p| (p.activate_at, p.field_id.clone()));
        due.into_iter().map(|p| p.field_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
