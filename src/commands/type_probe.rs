//! Type semantics probe: numeric-looking strings, type distribution, and
//! string-to-number coercion risk across a run's output records.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::artifact::load_record_sequence;
use crate::cli::TypeProbeArgs;

const MAX_LISTED: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct NumericString {
    pub path: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoercionRisk {
    pub path: String,
    pub value: String,
    pub risk: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TypeProbeReport {
    pub run_path: String,
    pub numeric_looking_strings: Vec<NumericString>,
    pub type_distribution: BTreeMap<&'static str, usize>,
    pub coercion_risk: Vec<CoercionRisk>,
    pub total_numeric_strings: usize,
    pub total_coercion_risks: usize,
}

pub fn run(args: TypeProbeArgs) -> Result<()> {
    if !args.run_path.exists() {
        let error = serde_json::json!({
            "error": format!("run path not found: {}", args.run_path.display()),
        });
        print_json(&error)?;
        bail!("run path not found: {}", args.run_path.display());
    }

    let report = probe_types(&args.run_path)?;
    print_json(&report)
}

pub fn probe_types(run_path: &Path) -> Result<TypeProbeReport> {
    let numeric = Regex::new(r"^-?\d+(\.\d+)?([eE][+-]?\d+)?$")
        .context("failed to compile numeric literal pattern")?;

    let records = load_record_sequence(run_path)?;

    let mut numeric_strings = Vec::new();
    let mut type_distribution = BTreeMap::new();
    for (_, record) in &records {
        collect_scalars(record, "", &mut |path, value| {
            match value {
                Value::String(s) => {
                    *type_distribution.entry("string").or_insert(0) += 1;
                    if numeric.is_match(s.trim()) {
                        numeric_strings.push(NumericString {
                            path: path.to_string(),
                            value: s.clone(),
                        });
                    }
                }
                Value::Number(_) => *type_distribution.entry("number").or_insert(0) += 1,
                Value::Bool(_) => *type_distribution.entry("boolean").or_insert(0) += 1,
                Value::Null => *type_distribution.entry("null").or_insert(0) += 1,
                Value::Array(_) | Value::Object(_) => {}
            }
        });
    }

    let coercion_risk: Vec<CoercionRisk> = numeric_strings
        .iter()
        .map(|entry| CoercionRisk {
            path: entry.path.clone(),
            value: entry.value.clone(),
            risk: "string->number",
        })
        .collect();

    let total_numeric_strings = numeric_strings.len();
    let total_coercion_risks = coercion_risk.len();
    Ok(TypeProbeReport {
        run_path: run_path.display().to_string(),
        numeric_looking_strings: numeric_strings.into_iter().take(MAX_LISTED).collect(),
        type_distribution,
        coercion_risk: coercion_risk.into_iter().take(MAX_LISTED).collect(),
        total_numeric_strings,
        total_coercion_risks,
    })
}

/// Walk every scalar value under a record, reporting its path.
fn collect_scalars(value: &Value, path: &str, visit: &mut impl FnMut(&str, &Value)) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                collect_scalars(child, &child_path, visit);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_scalars(child, &format!("{path}[{i}]"), visit);
            }
        }
        scalar => visit(path, scalar),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value)
        .context("failed to serialize type probe report to stdout")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::write_json_pretty;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn numeric_looking_strings_are_flagged_with_paths() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_json_pretty(
            &dir.path().join("outputs.json"),
            &json!([{
                "record_count": "3",
                "score": "1.25e3",
                "label": "baseline",
                "count": 7,
                "nested": {"total": "-12"}
            }]),
        )
        .expect("outputs should be written");

        let report = probe_types(dir.path()).expect("probe should succeed");
        assert_eq!(report.total_numeric_strings, 3);
        assert_eq!(report.total_coercion_risks, 3);

        let paths: Vec<&str> = report
            .numeric_looking_strings
            .iter()
            .map(|entry| entry.path.as_str())
            .collect();
        assert!(paths.contains(&"record_count"));
        assert!(paths.contains(&"score"));
        assert!(paths.contains(&"nested.total"));

        assert_eq!(report.type_distribution["string"], 4);
        assert_eq!(report.type_distribution["number"], 1);
        assert_eq!(report.coercion_risk[0].risk, "string->number");
    }

    #[test]
    fn listings_are_capped_but_totals_are_not() {
        let dir = TempDir::new().expect("tempdir should be created");
        let records: Vec<Value> = (0..30).map(|i| json!({"v": i.to_string()})).collect();
        write_json_pretty(&dir.path().join("outputs.json"), &json!(records))
            .expect("outputs should be written");

        let report = probe_types(dir.path()).expect("probe should succeed");
        assert_eq!(report.numeric_looking_strings.len(), MAX_LISTED);
        assert_eq!(report.coercion_risk.len(), MAX_LISTED);
        assert_eq!(report.total_numeric_strings, 30);
    }
}
