//! Explainability diff: compares two runs' output records and trace events,
//! and judges whether the trace evidence explains the observed output diff.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::artifact::{self, TraceNaming};
use crate::cli::ExplainArgs;
use crate::diff::{DiffEntry, deep_diff};
use crate::normalize::normalize_value;
use crate::util::write_json_pretty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Judgment {
    NoOutputDiff,
    TracesDoNotExplain,
    TracesMayExplain,
    /// No judgment rule applied confidently. Kept as a first-class value
    /// rather than an error.
    Uncertain,
}

#[derive(Debug, Serialize)]
pub struct NormalizationNote {
    /// Diff paths present raw but masked by normalization.
    pub removed_paths: Vec<String>,
    /// Diff paths introduced by normalization (not expected in practice).
    pub added_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExplainabilityReport {
    pub run_a: String,
    pub run_b: String,
    pub trace_naming_warning: Option<String>,
    pub raw_output_diffs: Vec<DiffEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output_diffs_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output_diffs_truncated: Option<bool>,
    pub normalized_output_diffs: Vec<DiffEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_output_diffs_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_output_diffs_truncated: Option<bool>,
    pub trace_diffs: Vec<DiffEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_diffs_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_diffs_truncated: Option<bool>,
    pub judgment: Judgment,
    pub reasons: Vec<String>,
    pub normalization_note: NormalizationNote,
}

pub fn run(args: ExplainArgs) -> Result<()> {
    for run_path in [&args.run_a, &args.run_b] {
        if !run_path.exists() {
            let error = serde_json::json!({
                "error": format!("run path not found: {}", run_path.display()),
            });
            print_json(&error)?;
            bail!("run path not found: {}", run_path.display());
        }
    }

    let report = compare(&args.run_a, &args.run_b, args.max_diffs)?;

    if let Some(out_dir) = &args.out {
        let report_path = out_dir.join("explainability_report.json");
        write_json_pretty(&report_path, &report)?;
        info!(path = %report_path.display(), "wrote explainability report");
    }

    print_json(&report)
}

/// Compare two runs and produce the full explainability report.
///
/// The judgment is always computed from the untruncated diff lists;
/// `max_diffs` only caps what the report carries.
pub fn compare(
    run_a: &Path,
    run_b: &Path,
    max_diffs: Option<usize>,
) -> Result<ExplainabilityReport> {
    let records_a = artifact::load_records(run_a)?;
    let records_b = artifact::load_records(run_b)?;
    let traces_a = artifact::load_traces(run_a)?;
    let traces_b = artifact::load_traces(run_b)?;

    let naming_a = artifact::infer_trace_naming(&run_a.join("traces"))?;
    let naming_b = artifact::infer_trace_naming(&run_b.join("traces"))?;
    let trace_naming_warning = trace_naming_warning(naming_a, naming_b);
    if let Some(warning) = &trace_naming_warning {
        warn!(warning = %warning, "proceeding with partial comparison");
    }

    let raw_output_diffs = diff_keyed(&records_a, &records_b, "query_");

    let normalized_a = normalize_records(&records_a);
    let normalized_b = normalize_records(&records_b);
    let normalized_output_diffs = diff_keyed(&normalized_a, &normalized_b, "query_");

    let trace_diffs = diff_keyed(&traces_a, &traces_b, "trace_");

    let (judgment, reasons) = judge(&raw_output_diffs, &trace_diffs);
    let normalization_note = normalization_note(&raw_output_diffs, &normalized_output_diffs);

    let (raw_output_diffs, raw_total, raw_truncated) = truncate(raw_output_diffs, max_diffs);
    let (normalized_output_diffs, normalized_total, normalized_truncated) =
        truncate(normalized_output_diffs, max_diffs);
    let (trace_diffs, trace_total, trace_truncated) = truncate(trace_diffs, max_diffs);

    Ok(ExplainabilityReport {
        run_a: run_a.display().to_string(),
        run_b: run_b.display().to_string(),
        trace_naming_warning,
        raw_output_diffs,
        raw_output_diffs_total: raw_total,
        raw_output_diffs_truncated: raw_truncated,
        normalized_output_diffs,
        normalized_output_diffs_total: normalized_total,
        normalized_output_diffs_truncated: normalized_truncated,
        trace_diffs,
        trace_diffs_total: trace_total,
        trace_diffs_truncated: trace_truncated,
        judgment,
        reasons,
        normalization_note,
    })
}

fn trace_naming_warning(naming_a: TraceNaming, naming_b: TraceNaming) -> Option<String> {
    if naming_a != TraceNaming::None && naming_b != TraceNaming::None && naming_a != naming_b {
        Some(format!(
            "trace naming generations differ ({} vs {}); trace keys are compared best-effort",
            naming_a.as_str(),
            naming_b.as_str()
        ))
    } else {
        None
    }
}

/// Diff two keyed collections over the union of their keys. An absent side
/// is compared as the empty mapping.
fn diff_keyed<K: Ord + Display>(
    a: &BTreeMap<K, Value>,
    b: &BTreeMap<K, Value>,
    prefix: &str,
) -> Vec<DiffEntry> {
    let empty = Value::Object(Map::new());
    let keys: BTreeSet<&K> = a.keys().chain(b.keys()).collect();

    let mut diffs = Vec::new();
    for key in keys {
        let va = a.get(key).unwrap_or(&empty);
        let vb = b.get(key).unwrap_or(&empty);
        diffs.extend(deep_diff(va, vb, &format!("{prefix}{key}")));
    }
    diffs
}

fn normalize_records(records: &BTreeMap<i64, Value>) -> BTreeMap<i64, Value> {
    records
        .iter()
        .map(|(index, record)| (*index, normalize_value(record)))
        .collect()
}

/// Judgment policy, first matching rule wins; `uncertain` when no rule
/// applies.
fn judge(raw_output_diffs: &[DiffEntry], trace_diffs: &[DiffEntry]) -> (Judgment, Vec<String>) {
    match judgment_rule(raw_output_diffs, trace_diffs) {
        Some((judgment, reason)) => (judgment, vec![reason]),
        None => (Judgment::Uncertain, Vec::new()),
    }
}

fn judgment_rule(
    raw_output_diffs: &[DiffEntry],
    trace_diffs: &[DiffEntry],
) -> Option<(Judgment, String)> {
    if raw_output_diffs.is_empty() {
        return Some((
            Judgment::NoOutputDiff,
            "outputs are identical; no explanation needed".to_string(),
        ));
    }
    if trace_diffs.is_empty() {
        return Some((
            Judgment::TracesDoNotExplain,
            "outputs differ but traces are identical or missing; no trace-level explanation for the output diff"
                .to_string(),
        ));
    }

    let output_paths: BTreeSet<&str> = raw_output_diffs.iter().map(DiffEntry::path).collect();
    let trace_paths: BTreeSet<&str> = trace_diffs.iter().map(DiffEntry::path).collect();
    let paths_overlap = !output_paths.is_disjoint(&trace_paths);
    // Heuristic proxy for a decision-point-related trace change.
    let mentions_decision = trace_diffs.iter().any(|entry| {
        serde_json::to_string(entry)
            .map(|serialized| serialized.contains("decision"))
            .unwrap_or(false)
    });

    if paths_overlap || mentions_decision {
        Some((
            Judgment::TracesMayExplain,
            "trace diffs overlap with or precede the output diffs".to_string(),
        ))
    } else {
        Some((
            Judgment::TracesDoNotExplain,
            "trace diffs exist but do not overlap any decision point".to_string(),
        ))
    }
}

/// Which diff paths normalization masked, and which it introduced.
fn normalization_note(
    raw_output_diffs: &[DiffEntry],
    normalized_output_diffs: &[DiffEntry],
) -> NormalizationNote {
    let raw_paths: BTreeSet<&str> = raw_output_diffs.iter().map(DiffEntry::path).collect();
    let normalized_paths: BTreeSet<&str> =
        normalized_output_diffs.iter().map(DiffEntry::path).collect();

    NormalizationNote {
        removed_paths: raw_paths
            .difference(&normalized_paths)
            .map(|path| path.to_string())
            .collect(),
        added_paths: normalized_paths
            .difference(&raw_paths)
            .map(|path| path.to_string())
            .collect(),
    }
}

fn truncate(
    diffs: Vec<DiffEntry>,
    max_diffs: Option<usize>,
) -> (Vec<DiffEntry>, Option<usize>, Option<bool>) {
    match max_diffs {
        Some(limit) if diffs.len() > limit => {
            let total = diffs.len();
            let mut kept = diffs;
            kept.truncate(limit);
            (kept, Some(total), Some(true))
        }
        _ => (diffs, None, None),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value)
        .context("failed to serialize report to stdout")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}
