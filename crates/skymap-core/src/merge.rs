//! Deep config merging
//!
//! Map entries are layered: main cloud defaults, then provider defaults,
//! then profile defaults, then per-instance map overrides. Later layers
//! win; nested objects merge key-wise instead of being replaced wholesale
//! so a map override of `minion.grains` keeps the profile's other minion
//! settings.

use serde_json::Value;

/// Merge `overlay` into `base`, overlay winning on conflicts
pub fn merge_value(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_val) if base_val.is_object() && overlay_val.is_object() => {
                        merge_value(base_val, overlay_val);
                    }
                    _ => {
                        base_map.insert(key.clone(), overlay_val.clone());
                    }
                }
            }
        }
        (base_slot, overlay_val) => {
            *base_slot = overlay_val.clone();
        }
    }
}
