//! The logical state dictionary shared by serve and update routes.

use std::collections::HashMap;

use serde_json::Value;

/// An opaque value stored under a state key.
///
/// Backed by [`serde_json::Value`] so that any `Serialize`/`Deserialize` user
/// type can be stashed in the dictionary without the state container itself
/// being generic over it.
pub type StateValue = Value;

/// The logical dictionary from string keys to opaque values (spec. §3).
pub type StateMap = HashMap<String, StateValue>;

/// Monotonically increasing counter of applied update batches (plus the
/// implicit batch represented by initialization).
pub type Version = u64;

/// Merges `partial` into `base`, key by key.
///
/// A partial update only ever replaces the keys it names; unmentioned keys
/// in `base` are left untouched. This is a shallow merge — nested objects in
/// `partial` fully replace the corresponding value in `base` rather than
/// merging recursively, matching the Python reference's plain `dict.update`.
pub fn merge_state(base: &mut StateMap, partial: StateMap) {
    for (key, value) in partial {
        base.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_replaces_named_keys_and_preserves_others() {
        let mut base: StateMap = HashMap::new();
        base.insert("value".into(), json!(1));
        base.insert("name".into(), json!("a"));

        let mut partial: StateMap = HashMap::new();
        partial.insert("value".into(), json!(2));

        merge_state(&mut base, partial);

        assert_eq!(base["value"], json!(2));
        assert_eq!(base["name"], json!("a"));
    }
}
