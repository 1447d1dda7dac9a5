//! Output normalization for comparison: numeric-string coercion under an
//! allowlist of count-like field names.

use serde_json::{Map, Value};

/// Field names whose string values are coerced to integers for comparison.
const COUNT_FIELDS: [&str; 5] = ["count", "record_count", "total", "num_records", "item_count"];

/// Normalize a value tree for comparison.
///
/// Structure, key set, sequence order, and length are preserved; the only
/// rewrite is string-to-integer coercion for integer literals directly under
/// an allowlisted key. Idempotent: coercing an already-integer value is a
/// no-op.
pub fn normalize_value(value: &Value) -> Value {
    normalize_with_key(value, None)
}

fn normalize_with_key(value: &Value, key: Option<&str>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), normalize_with_key(v, Some(k)));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| normalize_with_key(item, None))
                .collect(),
        ),
        Value::String(s) => {
            if key.is_some_and(|k| COUNT_FIELDS.contains(&k)) {
                if let Some(n) = parse_integer_literal(s) {
                    return Value::from(n);
                }
            }
            value.clone()
        }
        _ => value.clone(),
    }
}

/// Parse an optionally signed base-10 integer literal. Anything else,
/// including out-of-range literals, is left to the caller unchanged.
fn parse_integer_literal(s: &str) -> Option<i64> {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn allowlisted_integer_strings_are_coerced() {
        let normalized = normalize_value(&json!({"total": "42"}));
        assert_eq!(normalized, json!({"total": 42}));
    }

    #[test]
    fn non_numeric_strings_in_allowlisted_fields_stay_strings() {
        let normalized = normalize_value(&json!({"total": "N/A"}));
        assert_eq!(normalized, json!({"total": "N/A"}));
    }

    #[test]
    fn fields_outside_the_allowlist_are_untouched() {
        let normalized = normalize_value(&json!({"query_index": "5"}));
        assert_eq!(normalized, json!({"query_index": "5"}));
    }

    #[test]
    fn coercion_recurses_into_nested_objects() {
        let normalized = normalize_value(&json!({"summary": {"total": "100", "label": "test"}}));
        assert_eq!(normalized, json!({"summary": {"total": 100, "label": "test"}}));
    }

    #[test]
    fn coercion_uses_the_immediately_enclosing_key_only() {
        // The array element under "count" has no enclosing key of its own.
        let normalized = normalize_value(&json!({"count": ["7"]}));
        assert_eq!(normalized, json!({"count": ["7"]}));
    }

    #[test]
    fn sequences_preserve_order_and_length() {
        let value = json!([{"count": "1"}, {"count": "2"}, {"label": "x"}]);
        let normalized = normalize_value(&value);
        assert_eq!(normalized, json!([{"count": 1}, {"count": 2}, {"label": "x"}]));
    }

    #[test]
    fn signed_literals_are_coerced() {
        let normalized = normalize_value(&json!({"count": "-3", "record_count": "+12"}));
        assert_eq!(normalized, json!({"count": -3, "record_count": 12}));
    }

    #[test]
    fn out_of_range_and_malformed_literals_stay_strings() {
        let value = json!({
            "count": "99999999999999999999999999",
            "total": "1.5",
            "num_records": "",
            "item_count": "+"
        });
        assert_eq!(normalize_value(&value), value);
    }

    #[test]
    fn normalization_is_idempotent() {
        let value = json!({
            "record_count": "3",
            "summary": {"total": "42", "items": [{"count": "1"}, {"name": "a"}]},
            "final_response": "7"
        });
        let once = normalize_value(&value);
        let twice = normalize_value(&once);
        assert_eq!(once, twice);
    }
}
