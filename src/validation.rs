//! Schema and semantic validation for ingested records.

use serde_json::Value;
use thiserror::Error;

/// Validation failure, tagged with the index of the offending record.
///
/// Schema errors are structural (missing/empty/ill-typed fields); semantic
/// errors are structurally valid but logically wrong values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record {index}: {message}")]
    Schema { message: String, index: usize },
    #[error("record {index}: {message}")]
    Semantic { message: String, index: usize },
}

#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    /// Fields that must be present and non-empty in every record.
    pub required: Vec<String>,
    /// Fields that must be int-coercible when present.
    pub int_fields: Vec<String>,
    /// Minimum accepted value for a record's `count` field.
    pub min_count: Option<i64>,
}

/// Validate records against the rules, failing on the first violation.
pub fn validate(records: &[Value], rules: &ValidationRules) -> Result<(), ValidationError> {
    for (index, record) in records.iter().enumerate() {
        for field in &rules.required {
            match record.get(field) {
                None => {
                    return Err(ValidationError::Schema {
                        message: format!("missing required field: {field}"),
                        index,
                    });
                }
                Some(Value::Null) => {
                    return Err(ValidationError::Schema {
                        message: format!("required field {field} is empty"),
                        index,
                    });
                }
                Some(Value::String(s)) if s.is_empty() => {
                    return Err(ValidationError::Schema {
                        message: format!("required field {field} is empty"),
                        index,
                    });
                }
                Some(_) => {}
            }
        }

        for field in &rules.int_fields {
            if let Some(value) = record.get(field) {
                if coerce_int(value).is_none() {
                    return Err(ValidationError::Schema {
                        message: format!(
                            "{field} must be int, got {}",
                            crate::diff::value_type_name(value)
                        ),
                        index,
                    });
                }
            }
        }

        if let Some(min_count) = rules.min_count {
            if let Some(value) = record.get("count") {
                match coerce_int(value) {
                    None => {
                        return Err(ValidationError::Schema {
                            message: format!("count field is not numeric: {value}"),
                            index,
                        });
                    }
                    Some(count) if count < min_count => {
                        return Err(ValidationError::Semantic {
                            message: format!("count must be >= {min_count}, got {count}"),
                            index,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
    }

    Ok(())
}

/// Int coercion: integers pass through, floats truncate, and trimmed
/// integer-literal strings parse.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_records_pass() {
        let records = vec![json!({"name": "x", "count": 3})];
        let rules = ValidationRules {
            required: vec!["name".to_string()],
            int_fields: vec!["count".to_string()],
            min_count: Some(1),
        };
        validate(&records, &rules).expect("records should validate");
    }

    #[test]
    fn missing_required_field_is_a_schema_error_with_index() {
        let records = vec![json!({"name": "x"}), json!({"other": 1})];
        let rules = ValidationRules {
            required: vec!["name".to_string()],
            ..Default::default()
        };
        let error = validate(&records, &rules).expect_err("second record should fail");
        assert_eq!(
            error,
            ValidationError::Schema {
                message: "missing required field: name".to_string(),
                index: 1,
            }
        );
    }

    #[test]
    fn empty_required_field_is_a_schema_error() {
        let records = vec![json!({"name": ""})];
        let rules = ValidationRules {
            required: vec!["name".to_string()],
            ..Default::default()
        };
        let error = validate(&records, &rules).expect_err("empty value should fail");
        assert!(matches!(error, ValidationError::Schema { index: 0, .. }));
    }

    #[test]
    fn null_required_field_is_a_schema_error() {
        let records = vec![json!({"name": null})];
        let rules = ValidationRules {
            required: vec!["name".to_string()],
            ..Default::default()
        };
        validate(&records, &rules).expect_err("null value should fail");
    }

    #[test]
    fn int_field_accepts_numeric_strings() {
        let records = vec![json!({"count": "12"})];
        let rules = ValidationRules {
            int_fields: vec!["count".to_string()],
            ..Default::default()
        };
        validate(&records, &rules).expect("numeric string should coerce");
    }

    #[test]
    fn int_field_rejects_non_numeric_strings() {
        let records = vec![json!({"count": "many"})];
        let rules = ValidationRules {
            int_fields: vec!["count".to_string()],
            ..Default::default()
        };
        let error = validate(&records, &rules).expect_err("non-numeric should fail");
        assert!(matches!(error, ValidationError::Schema { .. }));
    }

    #[test]
    fn count_below_minimum_is_a_semantic_error() {
        let records = vec![json!({"count": 0})];
        let rules = ValidationRules {
            min_count: Some(1),
            ..Default::default()
        };
        let error = validate(&records, &rules).expect_err("low count should fail");
        assert_eq!(
            error,
            ValidationError::Semantic {
                message: "count must be >= 1, got 0".to_string(),
                index: 0,
            }
        );
    }

    #[test]
    fn records_without_a_count_field_skip_the_minimum_check() {
        let records = vec![json!({"name": "x"})];
        let rules = ValidationRules {
            min_count: Some(5),
            ..Default::default()
        };
        validate(&records, &rules).expect("absent count should be skipped");
    }
}
