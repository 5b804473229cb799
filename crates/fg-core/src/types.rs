//! Core type definitions for FocusGate
//!
//! These types are shared across the rule sets, the scheduled mutation
//! store, and the policy engine facade.

// =============================================================================
// Errors
// =============================================================================

/// Error type for policy operations.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The input could not be parsed as a URL, hostname, or term.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

// =============================================================================
// Rule Lists
// =============================================================================

/// The two rule collections gating navigation and content scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Domains navigation is permitted to (suffix-matched).
    Allow,
    /// Terms that block a page when found in its text.
    Deny,
}

impl ListKind {
    /// Stable name, used as the field-id prefix for scheduled entry adds.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "whitelist",
            Self::Deny => "blacklist",
        }
    }
}

/// One allow-list domain or deny-list term.
///
/// `activate_at == 0` means the entry is active immediately; otherwise it
/// is epoch milliseconds at which the entry takes effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEntry {
    pub key: String,
    pub activate_at: u64,
}

impl AccessEntry {
    /// Is this entry in effect at `now`?
    #[inline]
    pub fn is_active(&self, now: u64) -> bool {
        self.activate_at == 0 || now >= self.activate_at
    }
}

// =============================================================================
// Scheduled Mutations
// =============================================================================

/// A value carried by a scheduled mutation. Opaque to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Minutes(u64),
}

impl FieldValue {
    /// The value as a delay, if it is one.
    pub fn as_minutes(&self) -> Option<u64> {
        match self {
            Self::Minutes(m) => Some(*m),
            Self::Text(_) => None,
        }
    }

    /// The value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Minutes(_) => None,
        }
    }
}

/// One in-flight scheduled mutation, keyed by field identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingField {
    pub field_id: String,
    pub value: FieldValue,
    pub activate_at: u64,
}

/// Whether a requested change applied immediately or was deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleResult {
    Immediate,
    Deferred { activate_at: u64 },
}

/// Emitted by `tick()` when a due pending mutation is promoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionEvent {
    pub field_id: String,
    pub value: FieldValue,
}

// =============================================================================
// Facade Results
// =============================================================================

/// Outcome of requesting an entry addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// An active entry already covers this key; nothing changed.
    AlreadyActive,
    /// The entry is active now (effective delay was zero).
    Active,
    /// The entry was scheduled and activates at the given time.
    Pending { activate_at: u64 },
}

/// Outcome of requesting a configuration or delay field change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChangeOutcome {
    /// The new value equals the committed value; nothing was scheduled.
    Unchanged,
    Immediate,
    Deferred { activate_at: u64 },
}

/// Decision for a requested destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Blocked {
        /// Registrable-domain suggestion for an "add to whitelist" action.
        /// `None` when the URL could not be parsed.
        suggestion: Option<String>,
        /// Milliseconds until a pending allow entry for this host activates.
        remaining_ms: Option<u64>,
    },
}

impl Decision {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

// =============================================================================
// Delay Policy
// =============================================================================

/// Commit policy applied to changes of the delay-duration field itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayPolicy {
    /// Raising (or keeping) the delay applies immediately; lowering it is
    /// deferred until the current effective delay has elapsed.
    #[default]
    EscalateImmediately,
    /// Any change is deferred by the current effective delay, unless the
    /// effective delay is zero. Older observed behavior.
    AlwaysDefer,
}
