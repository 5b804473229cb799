//! FocusGate Core Library
//!
//! This crate decides, for any requested destination, whether navigation is
//! permitted, and governs how the rules behind that decision change over
//! time. Every rule change (adding an allowed domain, adding a blocked
//! term, relaxing the cool-down, replacing a configuration field) passes
//! through a mandatory, cancelable delay before taking effect.
//!
//! # Architecture
//!
//! The engine is synchronous and in-memory; `evaluate` never touches I/O.
//! A host drives `tick()` periodically while countdowns are shown, and
//! persistence lives in the `fg-store` crate.
//!
//! # Modules
//!
//! - `clock`: injected time source
//! - `host`: hostname normalization, suffix matching, registrable domains
//! - `text`: whole-word and phrase matching for deny-list terms
//! - `schedule`: the scheduled mutation store and its commit policies
//! - `rules`: the allow/deny rule sets
//! - `engine`: the policy engine facade
//! - `types`: shared type definitions

pub mod clock;
pub mod engine;
pub mod host;
pub mod rules;
pub mod schedule;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{sanitize_minutes, PolicyEngine, DELAY_FIELD};
pub use rules::AccessRuleSet;
pub use schedule::{CommitPolicy, MutationStore, MS_PER_MINUTE};
pub use text::{TermHit, TextField};
pub use types::{
    AccessEntry, AddOutcome, Decision, DelayPolicy, FieldChangeOutcome, FieldValue, ListKind,
    PendingField, PolicyError, PromotionEvent, ScheduleResult,
};
