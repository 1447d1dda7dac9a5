//! Metamorphic checks over existing runs: order preservation, normalization
//! idempotence, and type drift.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::artifact::load_record_sequence;
use crate::cli::CheckArgs;
use crate::normalize::normalize_value;
use crate::util::write_json_pretty;

#[derive(Debug, Serialize)]
pub struct CheckResult {
    /// `None` when the check was not applicable to this run.
    pub passed: Option<bool>,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RunChecks {
    pub order_preservation: CheckResult,
    pub normalization_idempotence: CheckResult,
    pub type_drift: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct OverallChecks {
    pub order_preservation: bool,
    pub normalization_idempotence: bool,
    pub type_drift: bool,
}

#[derive(Debug, Serialize)]
pub struct MetamorphicReport {
    pub runs: BTreeMap<String, RunChecks>,
    pub overall: OverallChecks,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let run_paths = resolve_run_paths(&args)?;
    if run_paths.is_empty() {
        bail!("no runs to check under {}", args.runs_root.display());
    }

    let report = check_runs(&run_paths)?;

    let out_path = args
        .out
        .clone()
        .unwrap_or_else(|| args.runs_root.join("metamorphic_report.json"));
    write_json_pretty(&out_path, &report)?;
    info!(
        path = %out_path.display(),
        run_count = report.runs.len(),
        "wrote metamorphic report"
    );

    Ok(())
}

fn resolve_run_paths(args: &CheckArgs) -> Result<Vec<PathBuf>> {
    if let Some(run_path) = &args.run_path {
        if !run_path.is_dir() {
            bail!("run path not found: {}", run_path.display());
        }
        return Ok(vec![run_path.clone()]);
    }

    if !args.runs_root.is_dir() {
        bail!("runs directory not found: {}", args.runs_root.display());
    }
    let mut paths = Vec::new();
    let entries = fs::read_dir(&args.runs_root)
        .with_context(|| format!("failed to read {}", args.runs_root.display()))?;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", args.runs_root.display()))?;
        let path = entry.path();
        if path.is_dir() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn check_runs(run_paths: &[PathBuf]) -> Result<MetamorphicReport> {
    let mut runs = BTreeMap::new();
    let mut overall = OverallChecks {
        order_preservation: true,
        normalization_idempotence: true,
        type_drift: true,
    };

    for run_path in run_paths {
        let checks = check_run(run_path)?;
        if checks.order_preservation.passed == Some(false) {
            overall.order_preservation = false;
        }
        if checks.normalization_idempotence.passed == Some(false) {
            overall.normalization_idempotence = false;
        }
        if checks.type_drift.passed == Some(false) {
            overall.type_drift = false;
        }
        runs.insert(run_path.display().to_string(), checks);
    }

    Ok(MetamorphicReport { runs, overall })
}

fn check_run(run_path: &Path) -> Result<RunChecks> {
    let records = load_record_sequence(run_path)?;
    Ok(RunChecks {
        order_preservation: check_order_preservation(&records),
        normalization_idempotence: check_normalization_idempotence(&records),
        type_drift: check_type_drift(&records),
    })
}

/// Records must preserve query-index order as stored.
fn check_order_preservation(records: &[(i64, Value)]) -> CheckResult {
    if records.is_empty() {
        return CheckResult {
            passed: None,
            reason: "no records".to_string(),
        };
    }
    let indices: Vec<i64> = records.iter().map(|(index, _)| *index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    if indices == sorted {
        CheckResult {
            passed: Some(true),
            reason: "indices ordered".to_string(),
        }
    } else {
        CheckResult {
            passed: Some(false),
            reason: format!("indices out of order: {indices:?}"),
        }
    }
}

/// Normalizing twice must equal normalizing once.
fn check_normalization_idempotence(records: &[(i64, Value)]) -> CheckResult {
    if records.is_empty() {
        return CheckResult {
            passed: None,
            reason: "no records".to_string(),
        };
    }
    for (index, record) in records {
        let once = normalize_value(record);
        let twice = normalize_value(&once);
        if once != twice {
            return CheckResult {
                passed: Some(false),
                reason: format!("record {index} is not idempotent under normalization"),
            };
        }
    }
    CheckResult {
        passed: Some(true),
        reason: "idempotent".to_string(),
    }
}

/// No surprise drift in the canonical fields: `query_index` must stay an
/// integer and `final_response` a string wherever present.
fn check_type_drift(records: &[(i64, Value)]) -> CheckResult {
    if records.is_empty() {
        return CheckResult {
            passed: None,
            reason: "no records".to_string(),
        };
    }
    for (index, record) in records {
        if let Some(value) = record.get("query_index") {
            if value.as_i64().is_none() {
                return CheckResult {
                    passed: Some(false),
                    reason: format!("record {index}: query_index drifted to {value}"),
                };
            }
        }
        if let Some(value) = record.get("final_response") {
            if !value.is_string() {
                return CheckResult {
                    passed: Some(false),
                    reason: format!("record {index}: final_response drifted to non-string"),
                };
            }
        }
    }
    CheckResult {
        passed: Some(true),
        reason: "expected types hold".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_run(dir: &Path, outputs: &Value) {
        write_json_pretty(&dir.join("outputs.json"), outputs).expect("outputs should be written");
    }

    #[test]
    fn clean_run_passes_all_checks() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_run(
            dir.path(),
            &json!([
                {"query_index": 0, "final_response": "a", "record_count": "2"},
                {"query_index": 1, "final_response": "b", "record_count": "2"}
            ]),
        );

        let report = check_runs(&[dir.path().to_path_buf()]).expect("checks should run");
        assert!(report.overall.order_preservation);
        assert!(report.overall.normalization_idempotence);
        assert!(report.overall.type_drift);
    }

    #[test]
    fn out_of_order_records_fail_order_preservation() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_run(
            dir.path(),
            &json!([{"query_index": 2, "final_response": "b"}, {"query_index": 0, "final_response": "a"}]),
        );

        let report = check_runs(&[dir.path().to_path_buf()]).expect("checks should run");
        assert!(!report.overall.order_preservation);
        assert!(report.overall.type_drift);
    }

    #[test]
    fn string_query_index_fails_type_drift() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_run(dir.path(), &json!([{"query_index": "0", "final_response": "a"}]));

        let report = check_runs(&[dir.path().to_path_buf()]).expect("checks should run");
        assert!(!report.overall.type_drift);
    }

    #[test]
    fn empty_run_leaves_checks_not_applicable() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_run(dir.path(), &json!([]));

        let report = check_runs(&[dir.path().to_path_buf()]).expect("checks should run");
        let checks = report.runs.values().next().expect("run entry should exist");
        assert_eq!(checks.order_preservation.passed, None);
        assert!(report.overall.order_preservation);
    }
}
