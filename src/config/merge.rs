//! Deep merge of configuration tiers.
//!
//! Objects merge key by key, everything else (arrays included) is replaced
//! by the higher tier. A `null` in a higher tier means "not specified".

use serde_json::Value;

/// Merge `overlay` on top of `base`.
///
/// ```
/// use serde_json::json;
/// use sheet_migrator::config::deep_merge;
///
/// let base = json!({"import": {"batch_size": 50, "max_retries": 3}});
/// let overlay = json!({"import": {"batch_size": 80}});
/// assert_eq!(
///     deep_merge(base, overlay),
///     json!({"import": {"batch_size": 80, "max_retries": 3}})
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Fold tiers lowest to highest.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_sections_merge_field_by_field() {
        let base = json!({
            "source": {"page_size": 100, "timeout_secs": 30},
            "import": {"dry_run": false}
        });
        let overlay = json!({"source": {"timeout_secs": 5}});
        assert_eq!(
            deep_merge(base, overlay),
            json!({
                "source": {"page_size": 100, "timeout_secs": 5},
                "import": {"dry_run": false}
            })
        );
    }

    #[test]
    fn status_score_maps_merge_by_key() {
        let base = json!({"reconcile": {"status_scores": {"approved": 1000, "submitted": 500}}});
        let overlay = json!({"reconcile": {"status_scores": {"submitted": 600, "draft": 10}}});
        assert_eq!(
            deep_merge(base, overlay),
            json!({"reconcile": {"status_scores": {"approved": 1000, "submitted": 600, "draft": 10}}})
        );
    }

    #[test]
    fn null_overlay_keeps_base() {
        let base = json!({"source": {"token": "abc"}});
        let overlay = json!({"source": {"token": null}});
        assert_eq!(deep_merge(base, overlay), json!({"source": {"token": "abc"}}));
    }

    #[test]
    fn arrays_are_replaced() {
        assert_eq!(
            deep_merge(json!({"stages": ["company", "user"]}), json!({"stages": ["sheet"]})),
            json!({"stages": ["sheet"]})
        );
    }

    #[test]
    fn merge_all_applies_tiers_in_order() {
        let tiers = vec![json!({"a": 1}), json!({"b": 2}), json!({"a": 3})];
        assert_eq!(deep_merge_all(tiers), json!({"a": 3, "b": 2}));
    }
}
