//! Parse JSON and CSV inputs into a common record list.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};

/// Parse JSON into records. A single object becomes a one-record list.
pub fn parse_json(raw: &str) -> Result<Vec<Value>> {
    let data: Value = serde_json::from_str(raw).context("failed to parse json input")?;
    match data {
        Value::Array(records) => Ok(records),
        Value::Object(_) => Ok(vec![data]),
        other => bail!("json input must be an object or array, got {other}"),
    }
}

/// Parse CSV into records. First row is the header; keys are lowercased and
/// every value is kept as a string.
pub fn parse_csv(raw: &str) -> Result<Vec<Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("failed to read csv header row")?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();

    let mut records = Vec::new();
    for (row_index, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("failed to parse csv row {}", row_index + 1))?;
        let mut record = Map::with_capacity(headers.len());
        for (header, field) in headers.iter().zip(row.iter()) {
            record.insert(header.clone(), Value::String(field.to_string()));
        }
        records.push(Value::Object(record));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_array_parses_to_records() {
        let records = parse_json(r#"[{"name": "x", "count": 3}]"#).expect("array should parse");
        assert_eq!(records, vec![json!({"name": "x", "count": 3})]);
    }

    #[test]
    fn json_single_object_becomes_one_record() {
        let records = parse_json(r#"{"name": "x"}"#).expect("object should parse");
        assert_eq!(records, vec![json!({"name": "x"})]);
    }

    #[test]
    fn json_scalar_input_is_rejected() {
        let error = parse_json("5").expect_err("bare scalar should be rejected");
        assert!(error.to_string().contains("object or array"));
    }

    #[test]
    fn csv_parses_with_lowercased_headers_and_string_values() {
        let records = parse_csv("Name,Count\na,1\nb,2").expect("csv should parse");
        assert_eq!(
            records,
            vec![
                json!({"name": "a", "count": "1"}),
                json!({"name": "b", "count": "2"}),
            ]
        );
    }

    #[test]
    fn empty_csv_body_yields_no_records() {
        let records = parse_csv("name,count\n").expect("header-only csv should parse");
        assert!(records.is_empty());
    }
}
