//! Policy Engine Facade
//!
//! The object collaborators talk to. It owns the rule sets, the scheduled
//! mutation store, the committed configuration values, and the injected
//! clock; there is no ambient state. Hosts drive it with `tick()` while a
//! countdown view is open; pending records carry absolute activation
//! times, so missed ticks only delay the notification, never the effect.

use std::collections::HashMap;

use log::debug;

use crate::clock::Clock;
use crate::host::{is_exempt_url, normalize_host, registrable_domain};
use crate::rules::AccessRuleSet;
use crate::schedule::{CommitPolicy, MutationStore, MS_PER_MINUTE};
use crate::text::{self, TermHit};
use crate::types::{
    AccessEntry, AddOutcome, Decision, DelayPolicy, FieldChangeOutcome, FieldValue, ListKind,
    PendingField, PolicyError, PromotionEvent, ScheduleResult,
};

/// Field identifier of the delay-duration field itself.
pub const DELAY_FIELD: &str = "delay_minutes";

/// Suffix of the field identifiers used for whole-list clears.
const CLEAR_SUFFIX: &str = ".clear";

// =============================================================================
// Helpers
// =============================================================================

/// Field identifier for a scheduled entry add, e.g. "whitelist:example.com".
fn entry_field_id(kind: ListKind, key: &str) -> String {
    format!("{}:{}", kind.as_str(), key)
}

/// Prefix shared by every scheduled entry add of one list.
fn entry_field_prefix(kind: ListKind) -> String {
    format!("{}:", kind.as_str())
}

/// Inverse of `entry_field_id`.
fn split_entry_field(field_id: &str) -> Option<(ListKind, &str)> {
    let (prefix, key) = field_id.split_once(':')?;
    let kind = match prefix {
        "whitelist" => ListKind::Allow,
        "blacklist" => ListKind::Deny,
        _ => return None,
    };
    Some((kind, key))
}

fn clear_field_id(kind: ListKind) -> String {
    format!("{}{}", kind.as_str(), CLEAR_SUFFIX)
}

/// Floor a raw delay input to a non-negative whole number of minutes.
/// Anything unparsable is zero.
pub fn sanitize_minutes(raw: &str) -> u64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v.floor() as u64,
        _ => 0,
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The policy engine.
pub struct PolicyEngine {
    clock: Box<dyn Clock>,
    rules: AccessRuleSet,
    store: MutationStore,
    /// Current committed delay. Mutated only through `DELAY_FIELD`
    /// promotions and immediate commits; scheduling of every other field
    /// reads this value, never its own pending one.
    delay_minutes: u64,
    delay_policy: DelayPolicy,
    config: HashMap<String, String>,
}

impl PolicyEngine {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self::with_delay_policy(clock, DelayPolicy::default())
    }

    pub fn with_delay_policy(clock: Box<dyn Clock>, delay_policy: DelayPolicy) -> Self {
        Self {
            clock,
            rules: AccessRuleSet::new(),
            store: MutationStore::new(),
            delay_minutes: 0,
            delay_policy,
            config: HashMap::new(),
        }
    }

    #[inline]
    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // -------------------------------------------------------------------------
    // Promotion plumbing
    // -------------------------------------------------------------------------

    fn apply_promotion(&mut self, event: &PromotionEvent) {
        if event.field_id == DELAY_FIELD {
            self.delay_minutes = event.value.as_minutes().unwrap_or(0);
            return;
        }
        if let Some(kind_name) = event.field_id.strip_suffix(CLEAR_SUFFIX) {
            let kind = match kind_name {
                "whitelist" => Some(ListKind::Allow),
                "blacklist" => Some(ListKind::Deny),
                _ => None,
            };
            if let Some(kind) = kind {
                // The clear takes everything with it, including entry adds
                // still serving out their own countdown. Leaving those
                // records behind would promote keys the rules no longer
                // hold.
                self.rules.clear(kind);
                self.store.cancel_prefix(&entry_field_prefix(kind));
                return;
            }
        }
        if split_entry_field(&event.field_id).is_some() {
            // List entries carry their own activation time; becoming
            // active needs no apply step.
            return;
        }
        if let Some(text) = event.value.as_text() {
            self.config.insert(event.field_id.clone(), text.to_string());
        }
    }

    /// Promote one field's pending record if due, silently. Reads that
    /// depend on a field's effective value go through this first, so state
    /// is correct even when no tick has run.
    fn promote_field_if_due(&mut self, field_id: &str) {
        let now = self.now();
        if let Some(event) = self.store.promote_if_due(field_id, now) {
            self.apply_promotion(&event);
        }
    }

    /// Promote every due pending record, silently. Mutation requests go
    /// through this first: a mutation must land on top of the state the
    /// clock says is current, not whatever the last tick left behind.
    fn promote_all_due(&mut self) {
        let now = self.now();
        for field_id in self.store.due_field_ids(now) {
            if let Some(event) = self.store.promote_if_due(&field_id, now) {
                self.apply_promotion(&event);
            }
        }
    }

    /// Whether a clear of `kind` is due but not yet promoted. Reads treat
    /// such a clear as already effective; only the record's removal (and
    /// the host notification) waits for a tick.
    fn clear_due(&self, kind: ListKind, now: u64) -> bool {
        self.store
            .get_raw(&clear_field_id(kind))
            .is_some_and(|p| now >= p.activate_at)
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    /// Decide whether navigation to `url` is permitted right now.
    ///
    /// Never blocks and never mutates: activation is a pure function of
    /// the stored entries and the clock.
    pub fn evaluate(&self, url: &str) -> Decision {
        if is_exempt_url(url) {
            return Decision::Allowed;
        }

        let host = match normalize_host(url) {
            Ok(host) => host,
            // Cannot whitelist what cannot be parsed: no suggestion.
            Err(_) => {
                return Decision::Blocked {
                    suggestion: None,
                    remaining_ms: None,
                }
            }
        };

        let now = self.now();
        if self.clear_due(ListKind::Allow, now) {
            return Decision::Blocked {
                suggestion: Some(registrable_domain(&host)),
                remaining_ms: None,
            };
        }
        if self.rules.evaluate(ListKind::Allow, &host, now) {
            return Decision::Allowed;
        }

        let remaining_ms = self
            .rules
            .pending_match(ListKind::Allow, &host, now)
            .map(|e| e.activate_at.saturating_sub(now));

        Decision::Blocked {
            suggestion: Some(registrable_domain(&host)),
            remaining_ms,
        }
    }

    /// Scan page title and body against the active deny-list terms.
    /// Returns the first hit, if any.
    pub fn scan_page(&self, title: &str, body: &str) -> Option<TermHit<'_>> {
        let now = self.now();
        if self.clear_due(ListKind::Deny, now) {
            return None;
        }
        text::scan(self.rules.active_keys(ListKind::Deny, now), title, body)
    }

    // -------------------------------------------------------------------------
    // Mutation requests
    // -------------------------------------------------------------------------

    /// Request adding a domain (allow) or term (deny) to a list.
    pub fn request_add_entry(
        &mut self,
        kind: ListKind,
        raw: &str,
    ) -> Result<AddOutcome, PolicyError> {
        let key = match kind {
            ListKind::Allow => normalize_host(raw)?,
            ListKind::Deny => AccessRuleSet::normalize_term(raw)?,
        };

        self.promote_all_due();
        let now = self.now();
        let effective = self.delay_minutes;
        let field_id = entry_field_id(kind, &key);

        if let Some(existing) = self.rules.get(kind, &key) {
            if existing.is_active(now) {
                return Ok(AddOutcome::AlreadyActive);
            }
            // Already scheduled. A later duplicate never re-delays the
            // entry; an earlier one (the delay shrank meanwhile) wins.
            let scheduled_at = existing.activate_at;
            if effective > 0 && now + effective * MS_PER_MINUTE >= scheduled_at {
                return Ok(AddOutcome::Pending {
                    activate_at: scheduled_at,
                });
            }
        }

        match self.store.schedule(
            &field_id,
            FieldValue::Text(key.clone()),
            effective,
            CommitPolicy::SymmetricDefer,
            now,
        ) {
            ScheduleResult::Immediate => {
                self.rules.upsert_earliest(
                    kind,
                    AccessEntry {
                        key,
                        activate_at: 0,
                    },
                );
                Ok(AddOutcome::Active)
            }
            ScheduleResult::Deferred { activate_at } => {
                let stored = self.rules.upsert_earliest(
                    kind,
                    AccessEntry {
                        key,
                        activate_at,
                    },
                );
                Ok(AddOutcome::Pending {
                    activate_at: stored.activate_at,
                })
            }
        }
    }

    /// Request changing the delay field or a named configuration field.
    pub fn request_field_change(
        &mut self,
        field_id: &str,
        raw_value: &str,
    ) -> Result<FieldChangeOutcome, PolicyError> {
        if split_entry_field(field_id).is_some() {
            return Err(PolicyError::InvalidInput(field_id.to_string()));
        }

        self.promote_all_due();
        let now = self.now();

        if field_id == DELAY_FIELD {
            let requested = sanitize_minutes(raw_value);
            let policy = match self.delay_policy {
                DelayPolicy::EscalateImmediately => CommitPolicy::EscalateImmediately,
                DelayPolicy::AlwaysDefer => CommitPolicy::SymmetricDefer,
            };
            return Ok(match self.store.schedule(
                DELAY_FIELD,
                FieldValue::Minutes(requested),
                self.delay_minutes,
                policy,
                now,
            ) {
                ScheduleResult::Immediate => {
                    debug!("delay set to {requested} min");
                    self.delay_minutes = requested;
                    FieldChangeOutcome::Immediate
                }
                ScheduleResult::Deferred { activate_at } => {
                    FieldChangeOutcome::Deferred { activate_at }
                }
            });
        }

        let committed = self.config.get(field_id).map_or("", String::as_str);
        if committed == raw_value {
            return Ok(FieldChangeOutcome::Unchanged);
        }

        Ok(match self.store.schedule(
            field_id,
            FieldValue::Text(raw_value.to_string()),
            self.delay_minutes,
            CommitPolicy::SymmetricDefer,
            now,
        ) {
            ScheduleResult::Immediate => {
                self.config
                    .insert(field_id.to_string(), raw_value.to_string());
                FieldChangeOutcome::Immediate
            }
            ScheduleResult::Deferred { activate_at } => {
                FieldChangeOutcome::Deferred { activate_at }
            }
        })
    }

    /// Request clearing a whole list, subject to the same deferral as any
    /// other relaxation.
    pub fn request_clear_list(&mut self, kind: ListKind) -> FieldChangeOutcome {
        self.promote_all_due();
        let now = self.now();
        let field_id = clear_field_id(kind);

        match self.store.schedule(
            &field_id,
            FieldValue::Text(kind.as_str().to_string()),
            self.delay_minutes,
            CommitPolicy::SymmetricDefer,
            now,
        ) {
            ScheduleResult::Immediate => {
                self.rules.clear(kind);
                FieldChangeOutcome::Immediate
            }
            ScheduleResult::Deferred { activate_at } => {
                FieldChangeOutcome::Deferred { activate_at }
            }
        }
    }

    /// Cancel a pending mutation. For list entries this also removes the
    /// scheduled entry, reverting the key to absent. Returns true if a
    /// pending record existed.
    ///
    /// Cancellation of a record whose due time has passed but which no
    /// tick has promoted yet is allowed to win.
    pub fn cancel_pending(&mut self, field_id: &str) -> bool {
        let existed = self.store.cancel(field_id);
        if existed {
            if let Some((kind, key)) = split_entry_field(field_id) {
                self.rules.remove(kind, key);
            }
        }
        existed
    }

    /// Promote every due pending mutation and report what changed.
    ///
    /// Ticks are idempotent; a promoted field emits exactly one event.
    pub fn tick(&mut self) -> Vec<PromotionEvent> {
        let now = self.now();
        let mut events = Vec::new();
        for field_id in self.store.due_field_ids(now) {
            if let Some(event) = self.store.promote_if_due(&field_id, now) {
                self.apply_promotion(&event);
                events.push(event);
            }
        }
        events
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// The pending record for a field, if any and not yet due.
    pub fn pending_state(&self, field_id: &str) -> Option<&PendingField> {
        self.store.get_pending(field_id, self.now())
    }

    /// Current effective delay, promoting a due pending change first.
    pub fn effective_delay_minutes(&mut self) -> u64 {
        self.promote_field_if_due(DELAY_FIELD);
        self.delay_minutes
    }

    /// Current effective value of a configuration field, promoting a due
    /// pending change first.
    pub fn config_value(&mut self, field_id: &str) -> Option<&str> {
        self.promote_field_if_due(field_id);
        self.config.get(field_id).map(String::as_str)
    }

    /// Remove a list entry outright (explicit collaborator removal).
    pub fn remove_entry(&mut self, kind: ListKind, key: &str) -> bool {
        self.promote_all_due();
        let key = key.trim().to_lowercase();
        self.store.cancel(&entry_field_id(kind, &key));
        self.rules.remove(kind, &key)
    }

    // -------------------------------------------------------------------------
    // Persistence support
    // -------------------------------------------------------------------------

    /// All entries of a list, unordered.
    pub fn entries(&self, kind: ListKind) -> impl Iterator<Item = &AccessEntry> {
        self.rules.entries(kind)
    }

    /// The committed delay without lazy promotion.
    pub fn committed_delay_minutes(&self) -> u64 {
        self.delay_minutes
    }

    /// The committed value of a configuration field without lazy promotion.
    pub fn committed_config(&self, field_id: &str) -> Option<&str> {
        self.config.get(field_id).map(String::as_str)
    }

    /// The raw pending record for a field, due or not.
    pub fn pending_raw(&self, field_id: &str) -> Option<&PendingField> {
        self.store.get_raw(field_id)
    }

    /// Restore a list entry from persisted state (earliest wins on
    /// duplicates). A not-yet-active entry also gets its pending record
    /// back so cancellation and tick events keep working.
    pub fn restore_entry(&mut self, kind: ListKind, entry: AccessEntry) {
        let now = self.now();
        if !entry.is_active(now) {
            self.store.restore(PendingField {
                field_id: entry_field_id(kind, &entry.key),
                value: FieldValue::Text(entry.key.clone()),
                activate_at: entry.activate_at,
            });
        }
        self.rules.upsert_earliest(kind, entry);
    }

    /// Restore the committed delay from persisted state.
    pub fn restore_committed_delay(&mut self, minutes: u64) {
        self.delay_minutes = minutes;
    }

    /// Restore a committed configuration value from persisted state.
    pub fn restore_config(&mut self, field_id: &str, value: &str) {
        self.config.insert(field_id.to_string(), value.to_string());
    }

    /// Restore a pending record from persisted state.
    pub fn restore_pending(&mut self, record: PendingField) {
        self.store.restore(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const T0: u64 = 1_700_000_000_000;
    const MIN: u64 = MS_PER_MINUTE;

    fn engine_at(clock: &ManualClock) -> PolicyEngine {
        PolicyEngine::new(Box::new(clock.clone()))
    }

    fn set_delay(engine: &mut PolicyEngine, minutes: u64) {
        // With a zero effective delay this commits immediately.
        let outcome = engine
            .request_field_change(DELAY_FIELD, &minutes.to_string())
            .unwrap();
        assert_eq!(outcome, FieldChangeOutcome::Immediate);
    }

    #[test]
    fn test_immediate_activation_with_zero_delay() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);

        let outcome = engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();
        assert_eq!(outcome, AddOutcome::Active);
        assert!(engine.evaluate("https://example.com").is_allowed());

        clock.advance(365 * 24 * 60 * MIN);
        assert!(engine.evaluate("https://example.com").is_allowed());
    }

    #[test]
    fn test_deferred_then_active_exactly_once() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        set_delay(&mut engine, 5);

        let outcome = engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();
        assert_eq!(
            outcome,
            AddOutcome::Pending {
                activate_at: T0 + 5 * MIN
            }
        );

        clock.set(T0 + MIN);
        assert!(!engine.evaluate("https://example.com").is_allowed());

        clock.set(T0 + 5 * MIN);
        assert!(engine.evaluate("https://example.com").is_allowed());

        let events = engine.tick();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field_id, "whitelist:example.com");

        // Ticking again after activation re-emits nothing
        assert!(engine.tick().is_empty());
        clock.advance(MIN);
        assert!(engine.tick().is_empty());
    }

    #[test]
    fn test_duplicate_add_earliest_wins() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        set_delay(&mut engine, 5);

        let first = engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();
        let t1 = T0 + 5 * MIN;
        assert_eq!(first, AddOutcome::Pending { activate_at: t1 });

        // A later duplicate would land at T0+2min+5min; the stored entry
        // keeps T1 and the pending record is untouched.
        clock.set(T0 + 2 * MIN);
        let second = engine
            .request_add_entry(ListKind::Allow, "EXAMPLE.com")
            .unwrap();
        assert_eq!(second, AddOutcome::Pending { activate_at: t1 });
        assert_eq!(
            engine.pending_state("whitelist:example.com").unwrap().activate_at,
            t1
        );

        clock.set(t1);
        assert!(engine.evaluate("https://example.com").is_allowed());
        let outcome = engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();
        assert_eq!(outcome, AddOutcome::AlreadyActive);
    }

    #[test]
    fn test_suffix_matching_through_facade() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();

        assert!(engine.evaluate("https://foo.example.com/page").is_allowed());
        match engine.evaluate("https://notexample.com") {
            Decision::Blocked { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("notexample.com"));
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn test_asymmetric_delay_policy() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        set_delay(&mut engine, 10);

        // Raising applies immediately
        let outcome = engine.request_field_change(DELAY_FIELD, "20").unwrap();
        assert_eq!(outcome, FieldChangeOutcome::Immediate);
        assert_eq!(engine.effective_delay_minutes(), 20);

        // Lowering serves out the current 20 minutes first
        let outcome = engine.request_field_change(DELAY_FIELD, "5").unwrap();
        assert_eq!(
            outcome,
            FieldChangeOutcome::Deferred {
                activate_at: T0 + 20 * MIN
            }
        );
        let pending = engine.pending_state(DELAY_FIELD).unwrap();
        assert_eq!(pending.value, FieldValue::Minutes(5));
        assert_eq!(pending.activate_at, T0 + 20 * MIN);
        assert_eq!(engine.effective_delay_minutes(), 20);

        clock.set(T0 + 20 * MIN);
        assert_eq!(engine.effective_delay_minutes(), 5);
        assert!(engine.pending_state(DELAY_FIELD).is_none());
    }

    #[test]
    fn test_always_defer_delay_policy() {
        let clock = ManualClock::new(T0);
        let mut engine = PolicyEngine::with_delay_policy(
            Box::new(clock.clone()),
            DelayPolicy::AlwaysDefer,
        );
        set_delay(&mut engine, 10);

        // Raising defers too under the older rule
        let outcome = engine.request_field_change(DELAY_FIELD, "20").unwrap();
        assert_eq!(
            outcome,
            FieldChangeOutcome::Deferred {
                activate_at: T0 + 10 * MIN
            }
        );
        assert_eq!(engine.effective_delay_minutes(), 10);

        clock.set(T0 + 10 * MIN);
        assert_eq!(engine.effective_delay_minutes(), 20);
    }

    #[test]
    fn test_cancellation_suppresses_promotion() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        set_delay(&mut engine, 5);

        engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();
        assert!(engine.cancel_pending("whitelist:example.com"));

        clock.set(T0 + 10 * MIN);
        assert!(!engine.evaluate("https://example.com").is_allowed());
        assert!(engine.tick().is_empty());
        assert!(!engine.cancel_pending("whitelist:example.com"));
    }

    #[test]
    fn test_blacklist_scanning() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        engine.request_add_entry(ListKind::Deny, "ad").unwrap();
        engine.request_add_entry(ListKind::Deny, "buy now").unwrap();

        assert!(engine.scan_page("advertisement", "plain text").is_none());
        let hit = engine.scan_page("Buy    NOW!!", "").unwrap();
        assert_eq!(hit.term, "buy now");
        assert!(engine.scan_page("buying nowhere", "").is_none());
        let hit = engine.scan_page("clean", "an ad appeared").unwrap();
        assert_eq!(hit.term, "ad");
    }

    #[test]
    fn test_pending_deny_terms_do_not_scan() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        set_delay(&mut engine, 5);
        engine.request_add_entry(ListKind::Deny, "poker").unwrap();

        assert!(engine.scan_page("poker night", "").is_none());
        clock.set(T0 + 5 * MIN);
        assert!(engine.scan_page("poker night", "").is_some());
    }

    #[test]
    fn test_config_field_lifecycle() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        set_delay(&mut engine, 5);

        let outcome = engine
            .request_field_change("llm.model", "focus-large")
            .unwrap();
        assert_eq!(
            outcome,
            FieldChangeOutcome::Deferred {
                activate_at: T0 + 5 * MIN
            }
        );
        // Committed value untouched while pending
        assert_eq!(engine.config_value("llm.model"), None);

        // Last-requested-wins: rescheduling replaces the pending record
        clock.set(T0 + MIN);
        engine.request_field_change("llm.model", "focus-mini").unwrap();
        let pending = engine.pending_state("llm.model").unwrap();
        assert_eq!(pending.value, FieldValue::Text("focus-mini".into()));
        assert_eq!(pending.activate_at, T0 + 6 * MIN);

        clock.set(T0 + 6 * MIN);
        let events = engine.tick();
        assert_eq!(events.len(), 1);
        assert_eq!(engine.config_value("llm.model"), Some("focus-mini"));

        // Re-requesting the committed value schedules nothing
        let outcome = engine
            .request_field_change("llm.model", "focus-mini")
            .unwrap();
        assert_eq!(outcome, FieldChangeOutcome::Unchanged);
    }

    #[test]
    fn test_cancel_config_field_keeps_committed() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        engine.request_field_change("llm.api_key", "sk-old").unwrap();
        set_delay(&mut engine, 5);

        engine.request_field_change("llm.api_key", "sk-new").unwrap();
        assert!(engine.cancel_pending("llm.api_key"));
        assert_eq!(engine.config_value("llm.api_key"), Some("sk-old"));

        clock.set(T0 + 10 * MIN);
        assert!(engine.tick().is_empty());
        assert_eq!(engine.config_value("llm.api_key"), Some("sk-old"));
    }

    #[test]
    fn test_lazy_promotion_without_tick() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        set_delay(&mut engine, 5);
        engine.request_field_change(DELAY_FIELD, "2").unwrap();

        // No tick ever runs; reading the delay after the due time still
        // sees the promoted value.
        clock.set(T0 + 5 * MIN);
        assert_eq!(engine.effective_delay_minutes(), 2);
    }

    #[test]
    fn test_protocol_exceptions() {
        let clock = ManualClock::new(T0);
        let engine = engine_at(&clock);
        assert!(engine.evaluate("about:blank").is_allowed());
        assert!(engine.evaluate("data:text/html;charset=utf-8,x").is_allowed());
        assert!(engine.evaluate("ai-chat://query/what%20is%20rust").is_allowed());
        assert!(!engine.evaluate("https://example.com").is_allowed());
    }

    #[test]
    fn test_unparsable_url_blocked_without_suggestion() {
        let clock = ManualClock::new(T0);
        let engine = engine_at(&clock);
        match engine.evaluate("https://") {
            Decision::Blocked {
                suggestion,
                remaining_ms,
            } => {
                assert!(suggestion.is_none());
                assert!(remaining_ms.is_none());
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn test_blocked_reports_pending_remaining() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        set_delay(&mut engine, 5);
        engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();

        clock.set(T0 + 2 * MIN);
        match engine.evaluate("https://api.example.com") {
            Decision::Blocked { remaining_ms, .. } => {
                assert_eq!(remaining_ms, Some(3 * MIN));
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn test_clear_list_is_deferred_like_everything_else() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();
        set_delay(&mut engine, 5);

        let outcome = engine.request_clear_list(ListKind::Allow);
        assert_eq!(
            outcome,
            FieldChangeOutcome::Deferred {
                activate_at: T0 + 5 * MIN
            }
        );
        assert!(engine.evaluate("https://example.com").is_allowed());

        clock.set(T0 + 5 * MIN);
        let events = engine.tick();
        assert_eq!(events.len(), 1);
        assert!(!engine.evaluate("https://example.com").is_allowed());
    }

    #[test]
    fn test_clear_promotion_discards_inflight_adds() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        set_delay(&mut engine, 5);
        engine.request_clear_list(ListKind::Allow);

        // Scheduled after the clear but due later; the clear wins.
        clock.set(T0 + 2 * MIN);
        let outcome = engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();
        assert_eq!(
            outcome,
            AddOutcome::Pending {
                activate_at: T0 + 7 * MIN
            }
        );

        clock.set(T0 + 5 * MIN);
        let events = engine.tick();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field_id, "whitelist.clear");

        // The entry's record went with the list; no stray event later,
        // and access stays consistent with the emptied rules.
        clock.set(T0 + 7 * MIN);
        assert!(engine.tick().is_empty());
        assert!(engine.pending_state("whitelist:example.com").is_none());
        assert!(!engine.evaluate("https://example.com").is_allowed());
    }

    #[test]
    fn test_due_clear_applies_without_tick() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();
        engine.request_add_entry(ListKind::Deny, "casino").unwrap();
        set_delay(&mut engine, 5);
        engine.request_clear_list(ListKind::Allow);
        engine.request_clear_list(ListKind::Deny);

        // Long past due, but the host never ticked.
        clock.set(T0 + 60 * MIN);
        assert_eq!(
            engine.evaluate("https://example.com"),
            Decision::Blocked {
                suggestion: Some("example.com".to_string()),
                remaining_ms: None,
            }
        );
        assert!(engine.scan_page("casino night", "").is_none());

        // Cancellation of the unpromoted record still wins the race.
        assert!(engine.cancel_pending("whitelist.clear"));
        assert!(engine.evaluate("https://example.com").is_allowed());
    }

    #[test]
    fn test_due_clear_promotes_before_new_add() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        engine.request_add_entry(ListKind::Allow, "old.com").unwrap();
        set_delay(&mut engine, 5);
        engine.request_clear_list(ListKind::Allow);

        clock.set(T0 + 6 * MIN);
        let outcome = engine.request_add_entry(ListKind::Allow, "new.com").unwrap();
        assert_eq!(
            outcome,
            AddOutcome::Pending {
                activate_at: T0 + 11 * MIN
            }
        );
        // The clear was promoted on the way in, silently.
        assert!(engine.tick().is_empty());
        assert!(!engine.evaluate("https://old.com").is_allowed());

        clock.set(T0 + 11 * MIN);
        assert!(engine.evaluate("https://new.com").is_allowed());
        assert!(!engine.evaluate("https://old.com").is_allowed());
    }

    #[test]
    fn test_sanitize_minutes() {
        assert_eq!(sanitize_minutes("5"), 5);
        assert_eq!(sanitize_minutes(" 7.9 "), 7);
        assert_eq!(sanitize_minutes("-3"), 0);
        assert_eq!(sanitize_minutes("abc"), 0);
        assert_eq!(sanitize_minutes(""), 0);
    }

    #[test]
    fn test_remove_entry_explicit() {
        let clock = ManualClock::new(T0);
        let mut engine = engine_at(&clock);
        engine
            .request_add_entry(ListKind::Allow, "example.com")
            .unwrap();
        assert!(engine.remove_entry(ListKind::Allow, "Example.COM"));
        assert!(!engine.evaluate("https://example.com").is_allowed());
        assert!(!engine.remove_entry(ListKind::Allow, "example.com"));
    }
}
