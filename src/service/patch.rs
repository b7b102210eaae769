use serde_json::{Map, Value};

/// Applies a JSON merge patch (RFC 7386) to `target`.
///
/// Object members merge recursively, `null` removes a member, and any other
/// patch value replaces the target outright.
pub fn merge_patch(target: &Value, patch: &Value) -> Value {
    let Value::Object(patch_members) = patch else {
        return patch.clone();
    };

    let mut merged = match target {
        Value::Object(members) => members.clone(),
        _ => Map::new(),
    };

    for (name, patch_value) in patch_members {
        if patch_value.is_null() {
            merged.remove(name);
            continue;
        }
        let current = merged.get(name).cloned().unwrap_or(Value::Null);
        merged.insert(name.clone(), merge_patch(&current, patch_value));
    }

    Value::Object(merged)
}
