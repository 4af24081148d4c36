//! Run-scoped variable store.
//!
//! Steps write captured values (identifiers, tokens, generated titles) into
//! named slots and later steps read them back through `${{ vars.NAME }}`
//! templates. A store lives for exactly one run; independent runs each own
//! their own store, so nothing leaks between them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A named value plus the step (or seed source) that last wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSlot {
    pub value: Value,
    pub written_by: String,
}

/// Named-slot registry shared by every step of a run.
///
/// Reads never coerce: a slot holding the string `"42"` is not an integer.
/// Slots are never removed; writing an existing name overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStore {
    slots: IndexMap<String, VariableSlot>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with seed values.
    pub fn seeded<'a>(seeds: impl IntoIterator<Item = (&'a String, &'a Value)>, source: &str) -> Self {
        let mut store = Self::new();
        for (name, value) in seeds {
            store.set(name, value.clone(), source);
        }
        store
    }

    /// Creates or overwrites a slot.
    pub fn set(&mut self, name: impl Into<String>, value: Value, writer: &str) {
        let name = name.into();
        debug!(slot = %name, writer, "variable slot written");
        self.slots.insert(
            name,
            VariableSlot {
                value,
                written_by: writer.to_string(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(|slot| &slot.value)
    }

    pub fn slot(&self, name: &str) -> Option<&VariableSlot> {
        self.slots.get(name)
    }

    /// Returns the slot value, or `fallback` when the slot was never written.
    pub fn get_or_default(&self, name: &str, fallback: Value) -> Value {
        self.get(name).cloned().unwrap_or(fallback)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots.iter().map(|(name, slot)| (name.as_str(), &slot.value))
    }

    /// Plain name → value copy of every slot, in write order.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.slots.iter().map(|(name, slot)| (name.clone(), slot.value.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_then_get_returns_value_unchanged() {
        let mut store = VariableStore::new();
        let values = [
            json!("catalog-65f0"),
            json!(42),
            json!(12.5),
            json!(true),
            json!(null),
            json!({"data": {"_id": "abc123"}, "tags": ["a", "b"]}),
        ];
        for (index, value) in values.iter().enumerate() {
            let name = format!("slot{index}");
            store.set(name.as_str(), value.clone(), "create_catalog");
            assert_eq!(store.get(&name), Some(value));
        }
    }

    #[test]
    fn typed_readers_do_not_coerce() {
        let mut store = VariableStore::new();
        store.set("count", json!("42"), "list");
        assert_eq!(store.get_str("count"), Some("42"));
        assert_eq!(store.get_i64("count"), None);

        store.set("count", json!(42), "list");
        assert_eq!(store.get_i64("count"), Some(42));
        assert_eq!(store.get_f64("count"), Some(42.0));
        assert_eq!(store.get_bool("count"), None);
    }

    #[test]
    fn absent_slot_uses_fallback() {
        let store = VariableStore::new();
        assert_eq!(store.get("catalogForAssignId"), None);
        assert_eq!(
            store.get_or_default("catalogForAssignId", json!("65f0c1d2e3a4b5c6d7e8f901")),
            json!("65f0c1d2e3a4b5c6d7e8f901")
        );
    }

    #[test]
    fn overwrite_keeps_single_slot_and_tracks_writer() {
        let mut store = VariableStore::seeded([(&"token".to_string(), &json!("seed"))], "config");
        assert_eq!(store.slot("token").map(|slot| slot.written_by.as_str()), Some("config"));

        store.set("token", json!("fresh"), "auth.login");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_str("token"), Some("fresh"));
        assert_eq!(store.slot("token").map(|slot| slot.written_by.as_str()), Some("auth.login"));
        assert_eq!(store.snapshot().get("token"), Some(&json!("fresh")));
    }
}
