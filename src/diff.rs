//! Structural diff over arbitrary JSON trees.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

const PREVIEW_MAX_CHARS: usize = 100;

/// One path-tagged difference between two trees.
///
/// Serializes to `{path, a_type, b_type, a_preview, b_preview}` on type
/// mismatch, `{path, len_a, len_b}` on sequence-length mismatch, and
/// `{path, a, b}` for leaf differences.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DiffEntry {
    TypeMismatch {
        path: String,
        a_type: &'static str,
        b_type: &'static str,
        a_preview: String,
        b_preview: String,
    },
    LengthMismatch {
        path: String,
        len_a: usize,
        len_b: usize,
    },
    Leaf {
        path: String,
        a: Value,
        b: Value,
    },
}

impl DiffEntry {
    pub fn path(&self) -> &str {
        match self {
            Self::TypeMismatch { path, .. }
            | Self::LengthMismatch { path, .. }
            | Self::Leaf { path, .. } => path,
        }
    }
}

/// JSON-family type name, with integers distinct from floats.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() <= PREVIEW_MAX_CHARS {
        return rendered;
    }
    rendered.chars().take(PREVIEW_MAX_CHARS).collect()
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

/// Recursively diff two values, tagging each difference with its path.
///
/// Object keys are walked in sorted union order so the output is
/// deterministic; an absent key participates as `null`. Sequences are
/// compared positionally: a length mismatch is reported once, and elements
/// past the shorter length are not individually diffed.
pub fn deep_diff(a: &Value, b: &Value, path: &str) -> Vec<DiffEntry> {
    let mut diffs = Vec::new();

    if value_type_name(a) != value_type_name(b) {
        diffs.push(DiffEntry::TypeMismatch {
            path: path.to_string(),
            a_type: value_type_name(a),
            b_type: value_type_name(b),
            a_preview: preview(a),
            b_preview: preview(b),
        });
        return diffs;
    }

    match (a, b) {
        (Value::Object(map_a), Value::Object(map_b)) => {
            let keys: BTreeSet<&String> = map_a.keys().chain(map_b.keys()).collect();
            for key in keys {
                let va = map_a.get(key).unwrap_or(&Value::Null);
                let vb = map_b.get(key).unwrap_or(&Value::Null);
                if va == vb {
                    continue;
                }
                if is_container(va) && is_container(vb) {
                    diffs.extend(deep_diff(va, vb, &child_path(path, key)));
                } else {
                    diffs.push(DiffEntry::Leaf {
                        path: child_path(path, key),
                        a: va.clone(),
                        b: vb.clone(),
                    });
                }
            }
        }
        (Value::Array(items_a), Value::Array(items_b)) => {
            if items_a.len() != items_b.len() {
                diffs.push(DiffEntry::LengthMismatch {
                    path: path.to_string(),
                    len_a: items_a.len(),
                    len_b: items_b.len(),
                });
            }
            for (i, (va, vb)) in items_a.iter().zip(items_b.iter()).enumerate() {
                if va != vb {
                    diffs.extend(deep_diff(va, vb, &format!("{path}[{i}]")));
                }
            }
        }
        _ => {
            if a != b {
                diffs.push(DiffEntry::Leaf {
                    path: path.to_string(),
                    a: a.clone(),
                    b: b.clone(),
                });
            }
        }
    }

    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_values_produce_no_entries() {
        let value = json!({"a": 1, "b": [1, 2, {"c": null}], "d": "x"});
        assert!(deep_diff(&value, &value, "").is_empty());
    }

    #[test]
    fn type_mismatch_emits_one_entry_and_stops() {
        let diffs = deep_diff(&json!(1), &json!("1"), "root");
        assert_eq!(
            diffs,
            vec![DiffEntry::TypeMismatch {
                path: "root".to_string(),
                a_type: "integer",
                b_type: "string",
                a_preview: "1".to_string(),
                b_preview: "\"1\"".to_string(),
            }]
        );
    }

    #[test]
    fn integer_and_float_are_distinct_types() {
        let diffs = deep_diff(&json!(1), &json!(1.5), "n");
        assert!(matches!(
            diffs.as_slice(),
            [DiffEntry::TypeMismatch { a_type: "integer", b_type: "number", .. }]
        ));
    }

    #[test]
    fn unequal_scalars_under_a_key_emit_a_leaf_entry() {
        let diffs = deep_diff(&json!({"x": 1}), &json!({"x": 2}), "");
        assert_eq!(
            diffs,
            vec![DiffEntry::Leaf {
                path: "x".to_string(),
                a: json!(1),
                b: json!(2),
            }]
        );
    }

    #[test]
    fn absent_key_participates_as_null() {
        let diffs = deep_diff(&json!({"x": 1}), &json!({}), "");
        assert_eq!(
            diffs,
            vec![DiffEntry::Leaf {
                path: "x".to_string(),
                a: json!(1),
                b: Value::Null,
            }]
        );

        // Key missing and key present with null compare equal.
        assert!(deep_diff(&json!({"x": null}), &json!({}), "").is_empty());
    }

    #[test]
    fn length_mismatch_is_reported_once_with_elementwise_prefix_diffs() {
        let diffs = deep_diff(&json!([1, 2, 3]), &json!([1, 9]), "arr");
        assert_eq!(
            diffs,
            vec![
                DiffEntry::LengthMismatch {
                    path: "arr".to_string(),
                    len_a: 3,
                    len_b: 2,
                },
                DiffEntry::Leaf {
                    path: "arr[1]".to_string(),
                    a: json!(2),
                    b: json!(9),
                },
            ]
        );
    }

    #[test]
    fn nested_paths_use_dots_and_brackets() {
        let a = json!({"summary": {"items": [{"total": 1}]}});
        let b = json!({"summary": {"items": [{"total": 2}]}});
        let diffs = deep_diff(&a, &b, "query_5");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path(), "query_5.summary.items[0].total");
    }

    #[test]
    fn object_keys_are_walked_in_sorted_order() {
        let a = json!({"zeta": 1, "alpha": 1, "mid": 1});
        let b = json!({"zeta": 2, "alpha": 2, "mid": 2});
        let diffs = deep_diff(&a, &b, "");
        let paths: Vec<&str> = diffs.iter().map(DiffEntry::path).collect();
        assert_eq!(paths, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn container_vs_scalar_under_a_key_is_a_leaf_entry() {
        // Recursion into mismatched kinds only happens when both sides are
        // containers; scalar-vs-object stays a leaf diff.
        let diffs = deep_diff(&json!({"x": {"y": 1}}), &json!({"x": 3}), "");
        assert_eq!(
            diffs,
            vec![DiffEntry::Leaf {
                path: "x".to_string(),
                a: json!({"y": 1}),
                b: json!(3),
            }]
        );
    }

    #[test]
    fn object_vs_array_under_a_key_recurses_into_a_type_mismatch() {
        let diffs = deep_diff(&json!({"x": {"y": 1}}), &json!({"x": [1]}), "");
        assert!(matches!(
            diffs.as_slice(),
            [DiffEntry::TypeMismatch { a_type: "object", b_type: "array", .. }]
        ));
        assert_eq!(diffs[0].path(), "x");
    }

    #[test]
    fn previews_are_truncated_to_one_hundred_chars() {
        let long = "x".repeat(300);
        let diffs = deep_diff(&json!(long), &json!(5), "p");
        match &diffs[0] {
            DiffEntry::TypeMismatch { a_preview, .. } => {
                assert_eq!(a_preview.chars().count(), 100);
            }
            other => panic!("expected type mismatch, got {other:?}"),
        }
    }
}
