//! Write-through policy store
//!
//! `PolicyStore` seeds a `PolicyEngine` from a `Backend` at startup, then
//! mirrors every successful mutation back out. The in-memory engine is the
//! sole source of truth during a session: a failed backend write never
//! rolls a mutation back, it only flips the `persisted` flag on the
//! receipt so the host can surface a transient warning. The failed key is
//! rewritten on the next mutation touching it.

use std::sync::Arc;

use log::warn;

use fg_core::{
    AddOutcome, Clock, Decision, DelayPolicy, FieldChangeOutcome, FieldValue, ListKind,
    PendingField, PolicyEngine, PolicyError, PromotionEvent, TermHit, DELAY_FIELD,
};

use crate::backend::Backend;
use crate::codec;
use crate::keys;

/// A facade result plus whether every backing write landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt<T> {
    pub outcome: T,
    pub persisted: bool,
}

fn list_key(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Allow => keys::ALLOWLIST,
        ListKind::Deny => keys::DENYLIST,
    }
}

/// List kind addressed by an entry field id like "whitelist:example.com".
fn entry_field_kind(field_id: &str) -> Option<ListKind> {
    match field_id.split_once(':')?.0 {
        "whitelist" => Some(ListKind::Allow),
        "blacklist" => Some(ListKind::Deny),
        _ => None,
    }
}

/// List kind addressed by a clear field id like "whitelist.clear".
fn clear_field_kind(field_id: &str) -> Option<ListKind> {
    match field_id.strip_suffix(".clear")? {
        "whitelist" => Some(ListKind::Allow),
        "blacklist" => Some(ListKind::Deny),
        _ => None,
    }
}

/// Inverse of `clear_field_kind`.
fn clear_field_id(kind: ListKind) -> String {
    format!("{}.clear", kind.as_str())
}

fn clear_pending_key(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Allow => keys::ALLOWLIST_CLEAR_PENDING_AT,
        ListKind::Deny => keys::DENYLIST_CLEAR_PENDING_AT,
    }
}

/// The persistence-backed policy store.
pub struct PolicyStore {
    backend: Arc<dyn Backend>,
    engine: PolicyEngine,
    config_fields: Vec<String>,
}

impl PolicyStore {
    /// Load persisted state from the backend and build an engine over it.
    ///
    /// Missing or malformed persisted data loads as empty state; nothing
    /// is permitted by default.
    pub async fn open(
        backend: Arc<dyn Backend>,
        clock: Box<dyn Clock>,
        delay_policy: DelayPolicy,
        config_fields: &[&str],
    ) -> Self {
        let mut engine = PolicyEngine::with_delay_policy(clock, delay_policy);

        if let Some(raw) = backend.get(keys::DELAY_MINUTES).await {
            engine.restore_committed_delay(codec::decode_u64(&raw));
        }
        Self::restore_pending_pair(
            &backend,
            &mut engine,
            DELAY_FIELD,
            keys::DELAY_PENDING_VALUE,
            keys::DELAY_PENDING_AT,
            true,
        )
        .await;

        for (key, kind) in [(keys::ALLOWLIST, ListKind::Allow), (keys::DENYLIST, ListKind::Deny)] {
            if let Some(raw) = backend.get(key).await {
                for entry in codec::decode_entries(&raw) {
                    engine.restore_entry(kind, entry);
                }
            }
        }

        for kind in [ListKind::Allow, ListKind::Deny] {
            let key = clear_pending_key(kind);
            if let Some(at_raw) = backend.get(key).await {
                let activate_at = codec::decode_u64(&at_raw);
                if activate_at == 0 {
                    warn!("dropping pending clear of {}: bad activation time {at_raw:?}", kind.as_str());
                    backend.remove(key).await;
                    continue;
                }
                engine.restore_pending(PendingField {
                    field_id: clear_field_id(kind),
                    value: FieldValue::Text(kind.as_str().to_string()),
                    activate_at,
                });
            }
        }

        for field in config_fields {
            if let Some(value) = backend.get(&keys::config_key(field)).await {
                engine.restore_config(field, &value);
            }
            Self::restore_pending_pair(
                &backend,
                &mut engine,
                field,
                &keys::config_pending_value_key(field),
                &keys::config_pending_at_key(field),
                false,
            )
            .await;
        }

        Self {
            backend,
            engine,
            config_fields: config_fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Restore one pending value/activation key pair. A pair with an
    /// unusable activation timestamp is dropped from the backend rather
    /// than resurrected as an immediately-due mutation.
    async fn restore_pending_pair(
        backend: &Arc<dyn Backend>,
        engine: &mut PolicyEngine,
        field_id: &str,
        value_key: &str,
        at_key: &str,
        numeric: bool,
    ) {
        let Some(at_raw) = backend.get(at_key).await else {
            return;
        };
        let Some(value_raw) = backend.get(value_key).await else {
            return;
        };
        let activate_at = codec::decode_u64(&at_raw);
        if activate_at == 0 {
            warn!("dropping pending record for {field_id}: bad activation time {at_raw:?}");
            backend.remove(value_key).await;
            backend.remove(at_key).await;
            return;
        }
        let value = if numeric {
            FieldValue::Minutes(codec::decode_u64(&value_raw))
        } else {
            FieldValue::Text(value_raw)
        };
        engine.restore_pending(PendingField {
            field_id: field_id.to_string(),
            value,
            activate_at,
        });
    }

    // -------------------------------------------------------------------------
    // Reads (synchronous, in-memory)
    // -------------------------------------------------------------------------

    pub fn evaluate(&self, url: &str) -> Decision {
        self.engine.evaluate(url)
    }

    pub fn scan_page(&self, title: &str, body: &str) -> Option<TermHit<'_>> {
        self.engine.scan_page(title, body)
    }

    pub fn pending_state(&self, field_id: &str) -> Option<&PendingField> {
        self.engine.pending_state(field_id)
    }

    pub fn effective_delay_minutes(&mut self) -> u64 {
        self.engine.effective_delay_minutes()
    }

    pub fn config_value(&mut self, field_id: &str) -> Option<&str> {
        self.engine.config_value(field_id)
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// The configuration fields loaded at startup.
    pub fn config_fields(&self) -> &[String] {
        &self.config_fields
    }

    // -------------------------------------------------------------------------
    // Mutations (write-through)
    // -------------------------------------------------------------------------

    pub async fn request_add_entry(
        &mut self,
        kind: ListKind,
        raw: &str,
    ) -> Result<Receipt<AddOutcome>, PolicyError> {
        let clears_before = self.snapshot_pending_clears();
        let outcome = self.engine.request_add_entry(kind, raw)?;
        let mut persisted = match outcome {
            AddOutcome::AlreadyActive => true,
            _ => self.save_list(kind).await,
        };
        persisted &= self.sync_promoted_clears(clears_before).await;
        Ok(Receipt { outcome, persisted })
    }

    pub async fn request_field_change(
        &mut self,
        field_id: &str,
        raw_value: &str,
    ) -> Result<Receipt<FieldChangeOutcome>, PolicyError> {
        let clears_before = self.snapshot_pending_clears();
        let outcome = self.engine.request_field_change(field_id, raw_value)?;
        let mut persisted = match outcome {
            FieldChangeOutcome::Unchanged => true,
            FieldChangeOutcome::Immediate => self.save_committed(field_id).await,
            FieldChangeOutcome::Deferred { .. } => self.save_pending_pair(field_id).await,
        };
        persisted &= self.sync_promoted_clears(clears_before).await;
        Ok(Receipt { outcome, persisted })
    }

    pub async fn request_clear_list(&mut self, kind: ListKind) -> Receipt<FieldChangeOutcome> {
        let clears_before = self.snapshot_pending_clears();
        let outcome = self.engine.request_clear_list(kind);
        let mut persisted = match outcome {
            FieldChangeOutcome::Unchanged => true,
            FieldChangeOutcome::Immediate => {
                let mut ok = self.save_list(kind).await;
                ok &= self.remove_checked(clear_pending_key(kind)).await;
                ok
            }
            // The countdown must survive a restart like any other pending
            // mutation; only the activation time needs recording.
            FieldChangeOutcome::Deferred { activate_at } => {
                self.set_checked(clear_pending_key(kind), &activate_at.to_string())
                    .await
            }
        };
        persisted &= self.sync_promoted_clears(clears_before).await;
        Receipt { outcome, persisted }
    }

    pub async fn cancel_pending(&mut self, field_id: &str) -> Receipt<bool> {
        let existed = self.engine.cancel_pending(field_id);
        if !existed {
            return Receipt {
                outcome: false,
                persisted: true,
            };
        }
        let persisted = if let Some(kind) = entry_field_kind(field_id) {
            self.save_list(kind).await
        } else if let Some(kind) = clear_field_kind(field_id) {
            self.remove_checked(clear_pending_key(kind)).await
        } else {
            self.remove_pending_pair(field_id).await
        };
        Receipt {
            outcome: true,
            persisted,
        }
    }

    pub async fn remove_entry(&mut self, kind: ListKind, key: &str) -> Receipt<bool> {
        let clears_before = self.snapshot_pending_clears();
        let existed = self.engine.remove_entry(kind, key);
        let mut persisted = if existed {
            self.save_list(kind).await
        } else {
            true
        };
        persisted &= self.sync_promoted_clears(clears_before).await;
        Receipt {
            outcome: existed,
            persisted,
        }
    }

    /// Promote due pending mutations, persist their effects, and return
    /// the promotion events for the host to dispatch.
    pub async fn tick(&mut self) -> Receipt<Vec<PromotionEvent>> {
        let events = self.engine.tick();
        let mut persisted = true;
        for event in &events {
            if event.field_id == DELAY_FIELD {
                persisted &= self.save_committed(DELAY_FIELD).await;
            } else if let Some(kind) = clear_field_kind(&event.field_id) {
                persisted &= self.save_list(kind).await;
                persisted &= self.remove_checked(clear_pending_key(kind)).await;
            } else if entry_field_kind(&event.field_id).is_some() {
                // Entry activations need no write: the persisted entry
                // already carries its activation time.
            } else {
                persisted &= self.save_committed(&event.field_id).await;
            }
        }
        Receipt {
            outcome: events,
            persisted,
        }
    }

    // -------------------------------------------------------------------------
    // Write helpers
    // -------------------------------------------------------------------------

    /// Which lists currently hold a pending clear record, indexed
    /// Allow-then-Deny. Taken before an engine call so silent promotions
    /// can be detected afterwards.
    fn snapshot_pending_clears(&self) -> [bool; 2] {
        [ListKind::Allow, ListKind::Deny]
            .map(|kind| self.engine.pending_raw(&clear_field_id(kind)).is_some())
    }

    /// Mirror clears the engine promoted lazily inside a mutation call:
    /// the emptied list is rewritten and the pending-clear key dropped, so
    /// a restart cannot replay the clear over entries added afterwards.
    async fn sync_promoted_clears(&self, before: [bool; 2]) -> bool {
        let mut ok = true;
        for (kind, was_pending) in [ListKind::Allow, ListKind::Deny].into_iter().zip(before) {
            if was_pending && self.engine.pending_raw(&clear_field_id(kind)).is_none() {
                ok &= self.save_list(kind).await;
                ok &= self.remove_checked(clear_pending_key(kind)).await;
            }
        }
        ok
    }

    async fn set_checked(&self, key: &str, value: &str) -> bool {
        let ok = self.backend.set(key, value).await;
        if !ok {
            warn!("failed to persist {key}; in-memory state retained");
        }
        ok
    }

    async fn remove_checked(&self, key: &str) -> bool {
        let ok = self.backend.remove(key).await;
        if !ok {
            warn!("failed to remove persisted {key}");
        }
        ok
    }

    async fn save_list(&self, kind: ListKind) -> bool {
        let payload = codec::encode_entries(self.engine.entries(kind));
        self.set_checked(list_key(kind), &payload).await
    }

    /// Persist a field's committed value and drop its pending pair.
    async fn save_committed(&self, field_id: &str) -> bool {
        if field_id == DELAY_FIELD {
            let minutes = self.engine.committed_delay_minutes().to_string();
            let mut ok = self.set_checked(keys::DELAY_MINUTES, &minutes).await;
            ok &= self.remove_checked(keys::DELAY_PENDING_VALUE).await;
            ok &= self.remove_checked(keys::DELAY_PENDING_AT).await;
            return ok;
        }
        let value = self.engine.committed_config(field_id).unwrap_or("");
        let mut ok = self
            .set_checked(&keys::config_key(field_id), value)
            .await;
        ok &= self
            .remove_checked(&keys::config_pending_value_key(field_id))
            .await;
        ok &= self
            .remove_checked(&keys::config_pending_at_key(field_id))
            .await;
        ok
    }

    /// Persist a field's pending record.
    async fn save_pending_pair(&self, field_id: &str) -> bool {
        let Some(pending) = self.engine.pending_raw(field_id) else {
            return true;
        };
        let at = pending.activate_at.to_string();
        let value = match &pending.value {
            FieldValue::Minutes(m) => m.to_string(),
            FieldValue::Text(s) => s.clone(),
        };
        if field_id == DELAY_FIELD {
            let mut ok = self.set_checked(keys::DELAY_PENDING_VALUE, &value).await;
            ok &= self.set_checked(keys::DELAY_PENDING_AT, &at).await;
            return ok;
        }
        let mut ok = self
            .set_checked(&keys::config_pending_value_key(field_id), &value)
            .await;
        ok &= self
            .set_checked(&keys::config_pending_at_key(field_id), &at)
            .await;
        ok
    }

    async fn remove_pending_pair(&self, field_id: &str) -> bool {
        if field_id == DELAY_FIELD {
            let mut ok = self.remove_checked(keys::DELAY_PENDING_VALUE).await;
            ok &= self.remove_checked(keys::DELAY_PENDING_AT).await;
            return ok;
        }
        let mut ok = self
            .remove_checked(&keys::config_pending_value_key(field_id))
            .await;
        ok &= self
            .remove_checked(&keys::config_pending_at_key(field_id))
            .await;
        ok
    }
}
