//! Run-artifact loading: output records, trace events, and manifests from
//! the on-disk layouts the pipeline generations have produced.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::model::RunManifest;
use crate::util::{read_json_value, write_json_pretty};

/// Files in a run directory that are never output records.
const NON_RECORD_FILES: [&str; 3] = ["config.json", "index.json", "manifest.json"];

/// Trace filename generation.
///
/// v1 runs wrote `trace_<index>.json`; v2 runs write
/// `trace_<index>_<decision_point>.json`. Comparisons across generations
/// proceed best-effort with an explicit warning since the key spaces do not
/// line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceNaming {
    None,
    V1,
    V2,
}

impl TraceNaming {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

/// Load a run's output records keyed by record index.
pub fn load_records(run_path: &Path) -> Result<BTreeMap<i64, Value>> {
    Ok(load_record_sequence(run_path)?.into_iter().collect())
}

/// Load a run's output records in stored order, paired with their record
/// indices.
///
/// Resolution order: an `outputs.json` file if present (array indexed by
/// position, object with a `records` list, or any other value as a single
/// record at index 0); otherwise every other `*.json` file in the run
/// directory, one record per file in filename-sorted order. A record's own
/// `query_index` (or `index`) field overrides the positional index.
pub fn load_record_sequence(run_path: &Path) -> Result<Vec<(i64, Value)>> {
    let outputs_path = run_path.join("outputs.json");
    let records = if outputs_path.exists() {
        match read_json_value(&outputs_path)? {
            Value::Array(records) => records,
            Value::Object(mut map) => match map.remove("records") {
                Some(Value::Array(records)) => records,
                Some(other) => {
                    map.insert("records".to_string(), other);
                    vec![Value::Object(map)]
                }
                None => vec![Value::Object(map)],
            },
            other => vec![other],
        }
    } else {
        let mut records = Vec::new();
        for path in sorted_json_files(run_path)? {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            if NON_RECORD_FILES.contains(&name) {
                continue;
            }
            records.push(read_json_value(&path)?);
        }
        records
    };

    Ok(records
        .into_iter()
        .enumerate()
        .map(|(position, record)| (record_key(&record, position), record))
        .collect())
}

/// A record's index: its own `query_index`/`index` field when it carries an
/// integer (or integer-literal string), else its position.
fn record_key(record: &Value, position: usize) -> i64 {
    let declared = record.get("query_index").or_else(|| record.get("index"));
    match declared {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(position as i64),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(position as i64),
        _ => position as i64,
    }
}

/// Load a run's trace events keyed by trace key.
///
/// Prefers a single `traces.json` object (key to event); otherwise scans the
/// `traces/` subdirectory, keyed by filename stem.
pub fn load_traces(run_path: &Path) -> Result<BTreeMap<String, Value>> {
    let mut traces = BTreeMap::new();

    let traces_file = run_path.join("traces.json");
    if traces_file.exists() {
        if let Value::Object(map) = read_json_value(&traces_file)? {
            for (key, event) in map {
                traces.insert(key, event);
            }
        }
        return Ok(traces);
    }

    let traces_dir = run_path.join("traces");
    if traces_dir.is_dir() {
        for path in sorted_json_files(&traces_dir)? {
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(ToOwned::to_owned)
                .with_context(|| format!("invalid trace filename: {}", path.display()))?;
            traces.insert(stem, read_json_value(&path)?);
        }
    }

    Ok(traces)
}

/// Infer which trace naming generation a traces directory uses.
///
/// `None` when the directory is absent or holds no JSON files; `V2` when any
/// stem splits into three or more underscore-separated segments (a
/// decision-point suffix beyond `trace_<index>`); else `V1`.
pub fn infer_trace_naming(traces_dir: &Path) -> Result<TraceNaming> {
    if !traces_dir.is_dir() {
        return Ok(TraceNaming::None);
    }

    let mut naming = TraceNaming::None;
    for path in sorted_json_files(traces_dir)? {
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if stem.split('_').count() >= 3 {
            return Ok(TraceNaming::V2);
        }
        naming = TraceNaming::V1;
    }

    Ok(naming)
}

/// Read a run's manifest. Returns `None` when the run has no manifest.
pub fn read_manifest(run_path: &Path) -> Result<Option<RunManifest>> {
    let path = run_path.join("manifest.json");
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(manifest))
}

pub fn write_manifest(run_path: &Path, manifest: &RunManifest) -> Result<()> {
    write_json_pretty(&run_path.join("manifest.json"), manifest)
}

fn sorted_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if path.is_file() && is_json {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_json(dir: &Path, name: &str, value: &Value) {
        write_json_pretty(&dir.join(name), value).expect("fixture json should be written");
    }

    #[test]
    fn outputs_array_is_indexed_by_position() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_json(
            dir.path(),
            "outputs.json",
            &json!([{"final_response": "a"}, {"final_response": "b"}]),
        );

        let records = load_records(dir.path()).expect("records should load");
        assert_eq!(records.len(), 2);
        assert_eq!(records[&0]["final_response"], "a");
        assert_eq!(records[&1]["final_response"], "b");
    }

    #[test]
    fn outputs_object_with_records_field_uses_that_list() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_json(
            dir.path(),
            "outputs.json",
            &json!({"label": "run", "records": [{"final_response": "a"}]}),
        );

        let records = load_records(dir.path()).expect("records should load");
        assert_eq!(records.len(), 1);
        assert_eq!(records[&0]["final_response"], "a");
    }

    #[test]
    fn outputs_bare_object_is_a_single_record_at_index_zero() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_json(dir.path(), "outputs.json", &json!({"final_response": "only"}));

        let records = load_records(dir.path()).expect("records should load");
        assert_eq!(records.len(), 1);
        assert_eq!(records[&0]["final_response"], "only");
    }

    #[test]
    fn query_index_field_overrides_position() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_json(
            dir.path(),
            "outputs.json",
            &json!([{"query_index": 7, "v": "a"}, {"index": "3", "v": "b"}, {"v": "c"}]),
        );

        let records = load_records(dir.path()).expect("records should load");
        assert_eq!(records[&7]["v"], "a");
        assert_eq!(records[&3]["v"], "b");
        assert_eq!(records[&2]["v"], "c");
    }

    #[test]
    fn scan_fallback_skips_config_index_and_manifest() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_json(dir.path(), "config.json", &json!({"format": "json"}));
        write_json(dir.path(), "index.json", &json!({"grid_id": "g"}));
        write_json(dir.path(), "manifest.json", &json!({"config": {}}));
        write_json(dir.path(), "b_record.json", &json!({"v": "second"}));
        write_json(dir.path(), "a_record.json", &json!({"v": "first"}));

        let records = load_records(dir.path()).expect("records should load");
        assert_eq!(records.len(), 2);
        assert_eq!(records[&0]["v"], "first");
        assert_eq!(records[&1]["v"], "second");
    }

    #[test]
    fn traces_json_object_is_preferred_over_traces_dir() {
        let dir = TempDir::new().expect("tempdir should be created");
        write_json(
            dir.path(),
            "traces.json",
            &json!({"t1": {"decision_point": "a"}}),
        );
        let traces_dir = dir.path().join("traces");
        write_json_pretty(
            &traces_dir.join("trace_0_other.json"),
            &json!({"decision_point": "b"}),
        )
        .expect("trace file should be written");

        let traces = load_traces(dir.path()).expect("traces should load");
        assert_eq!(traces.len(), 1);
        assert_eq!(traces["t1"]["decision_point"], "a");
    }

    #[test]
    fn traces_dir_files_are_keyed_by_stem() {
        let dir = TempDir::new().expect("tempdir should be created");
        let traces_dir = dir.path().join("traces");
        write_json_pretty(
            &traces_dir.join("trace_0_validate_config.json"),
            &json!({"decision_point": "validate_config", "outcome": "ok"}),
        )
        .expect("trace file should be written");

        let traces = load_traces(dir.path()).expect("traces should load");
        assert_eq!(traces["trace_0_validate_config"]["outcome"], "ok");
    }

    #[test]
    fn missing_traces_load_as_empty() {
        let dir = TempDir::new().expect("tempdir should be created");
        let traces = load_traces(dir.path()).expect("traces should load");
        assert!(traces.is_empty());
    }

    #[test]
    fn trace_naming_is_none_for_absent_or_empty_dir() {
        let dir = TempDir::new().expect("tempdir should be created");
        assert_eq!(
            infer_trace_naming(&dir.path().join("traces")).expect("inference should succeed"),
            TraceNaming::None
        );

        std::fs::create_dir(dir.path().join("traces")).expect("dir should be created");
        assert_eq!(
            infer_trace_naming(&dir.path().join("traces")).expect("inference should succeed"),
            TraceNaming::None
        );
    }

    #[test]
    fn trace_naming_distinguishes_v1_and_v2_stems() {
        let dir = TempDir::new().expect("tempdir should be created");
        let traces_dir = dir.path().join("traces");
        write_json_pretty(&traces_dir.join("trace_0.json"), &json!({}))
            .expect("trace file should be written");
        assert_eq!(
            infer_trace_naming(&traces_dir).expect("inference should succeed"),
            TraceNaming::V1
        );

        write_json_pretty(&traces_dir.join("trace_1_requery.json"), &json!({}))
            .expect("trace file should be written");
        assert_eq!(
            infer_trace_naming(&traces_dir).expect("inference should succeed"),
            TraceNaming::V2
        );
    }

    #[test]
    fn manifest_round_trips_and_reads_legacy_key() {
        let dir = TempDir::new().expect("tempdir should be created");
        assert!(
            read_manifest(dir.path())
                .expect("missing manifest should be ok")
                .is_none()
        );

        let manifest = RunManifest::new(json!({"format": "json"}), "input.json".to_string());
        write_manifest(dir.path(), &manifest).expect("manifest should be written");
        let loaded = read_manifest(dir.path())
            .expect("manifest should be readable")
            .expect("manifest should exist");
        assert_eq!(loaded.trace_schema(), Some("v2"));

        write_json(
            dir.path(),
            "manifest.json",
            &json!({"config": {}, "trace_schemaversion": "v1"}),
        );
        let legacy = read_manifest(dir.path())
            .expect("legacy manifest should be readable")
            .expect("legacy manifest should exist");
        assert_eq!(legacy.trace_schema(), Some("v1"));
    }
}
