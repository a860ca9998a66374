//! Recursive merge of partial snapshot updates.

use serde_json::Value;

/// Merge `patch` into `target`.
///
/// Objects merge key-by-key, leaving untouched siblings in place. Scalars,
/// arrays and `null` replace the target value wholesale.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
