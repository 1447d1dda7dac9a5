//! Single-run introspector: schema and types per field, record count,
//! ordering signature, trace inventory, missing trace fields.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;

use crate::artifact::{load_record_sequence, load_traces};
use crate::cli::ProbeArgs;
use crate::diff::value_type_name;

/// Fields every trace event is expected to carry.
const EXPECTED_TRACE_FIELDS: [&str; 4] = ["decision_point", "params", "outcome", "timestamp"];

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub run_path: String,
    pub record_count: usize,
    /// Value path -> sorted set of observed type names.
    pub schema: BTreeMap<String, BTreeSet<String>>,
    pub ordering_signature: String,
    pub trace_inventory: Vec<String>,
    pub missing_trace_fields: Vec<String>,
}

pub fn run(args: ProbeArgs) -> Result<()> {
    if !args.run_path.exists() {
        let error = serde_json::json!({
            "error": format!("run path not found: {}", args.run_path.display()),
        });
        print_json(&error)?;
        bail!("run path not found: {}", args.run_path.display());
    }

    let report = probe(&args.run_path)?;
    print_json(&report)
}

pub fn probe(run_path: &Path) -> Result<ProbeReport> {
    let records = load_record_sequence(run_path)?;
    let traces = load_traces(run_path)?;

    let mut schema = BTreeMap::new();
    for (_, record) in &records {
        collect_types(record, "", &mut schema);
    }

    let ordering_signature = ordering_signature(&records);
    let trace_inventory: Vec<String> = traces.keys().cloned().collect();
    let missing_trace_fields = match traces.values().next() {
        Some(Value::Object(sample)) => EXPECTED_TRACE_FIELDS
            .iter()
            .filter(|field| !sample.contains_key(**field))
            .map(|field| field.to_string())
            .collect(),
        Some(_) => EXPECTED_TRACE_FIELDS
            .iter()
            .map(|field| field.to_string())
            .collect(),
        None => Vec::new(),
    };

    Ok(ProbeReport {
        run_path: run_path.display().to_string(),
        record_count: records.len(),
        schema,
        ordering_signature,
        trace_inventory,
        missing_trace_fields,
    })
}

/// Record value paths and their observed types. Arrays are sampled by their
/// first element under `path[]`.
fn collect_types(value: &Value, path: &str, schema: &mut BTreeMap<String, BTreeSet<String>>) {
    schema
        .entry(if path.is_empty() { ".".to_string() } else { path.to_string() })
        .or_default()
        .insert(value_type_name(value).to_string());

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                collect_types(child, &child_path, schema);
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first() {
                collect_types(first, &format!("{path}[]"), schema);
            }
        }
        _ => {}
    }
}

/// `ordered` when the declared record indices match their stored order,
/// else the first few indices for diagnosis.
fn ordering_signature(records: &[(i64, Value)]) -> String {
    if records.is_empty() {
        return "empty".to_string();
    }
    let declared: Vec<i64> = records.iter().map(|(index, _)| *index).collect();
    let mut sorted = declared.clone();
    sorted.sort_unstable();
    if declared == sorted {
        "ordered".to_string()
    } else {
        let head: Vec<String> = declared.iter().take(5).map(i64::to_string).collect();
        format!("unordered:[{}]...", head.join(", "))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value)
        .context("failed to serialize probe report to stdout")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
