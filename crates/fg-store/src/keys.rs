//! Persisted key layout
//!
//! One key per list, one committed/pending key pair per managed field.
//! Pending pairs store the pending value and its activation timestamp
//! under separate keys, mirroring how the engine keeps the committed value
//! untouched while a change is in flight.

/// Allow-list entries, as a JSON array.
pub const ALLOWLIST: &str = "allowlist";

/// Deny-list terms, as a JSON array.
pub const DENYLIST: &str = "denylist";

/// Committed delay, in whole minutes.
pub const DELAY_MINUTES: &str = "delay_minutes";

/// Pending delay value and activation time.
pub const DELAY_PENDING_VALUE: &str = "delay_minutes.pending_value";
pub const DELAY_PENDING_AT: &str = "delay_minutes.pending_at";

/// Activation time of a deferred whole-list clear, one key per list. Only
/// the timestamp needs persisting; the list it targets is in the key.
pub const ALLOWLIST_CLEAR_PENDING_AT: &str = "allowlist.clear_pending_at";
pub const DENYLIST_CLEAR_PENDING_AT: &str = "denylist.clear_pending_at";

/// The configuration fields managed by default: the three LLM settings of
/// the shell. The store treats field names opaquely; this is just the set
/// loaded at startup unless the host overrides it.
pub const DEFAULT_CONFIG_FIELDS: &[&str] = &["llm.api_key", "llm.model", "llm.system_prompt"];

/// Committed key for a configuration field.
pub fn config_key(field: &str) -> String {
    format!("config.{field}")
}

/// Pending-value key for a configuration field.
pub fn config_pending_value_key(field: &str) -> String {
    format!("config.{field}.pending_value")
}

/// Pending-activation key for a configuration field.
pub fn config_pending_at_key(field: &str) -> String {
    format!("config.{field}.pending_at")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_key_shapes() {
        assert_eq!(config_key("llm.model"), "config.llm.model");
        assert_eq!(
            config_pending_value_key("llm.model"),
            "config.llm.model.pending_value"
        );
        assert_eq!(
            config_pending_at_key("llm.model"),
            "config.llm.model.pending_at"
        );
    }
}
