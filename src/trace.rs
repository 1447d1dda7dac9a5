//! Trace emission: one JSON file per decision point under a run's traces/
//! directory.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::{Value, json};

use crate::util::{ensure_directory, write_json_pretty};

/// Scoped trace writer owned by a run context.
///
/// Files are named `trace_<index>_<decision_point>.json` (the v2 naming
/// generation). Events carry no timestamp: re-running an identical config
/// must produce byte-identical trace files.
#[derive(Debug)]
pub struct TraceWriter {
    traces_dir: PathBuf,
}

impl TraceWriter {
    pub fn create(run_dir: &Path) -> Result<Self> {
        let traces_dir = run_dir.join("traces");
        ensure_directory(&traces_dir)?;
        Ok(Self { traces_dir })
    }

    pub fn emit(
        &self,
        query_index: i64,
        decision_point: &str,
        params: Value,
        outcome: &str,
    ) -> Result<()> {
        let event = json!({
            "decision_point": decision_point,
            "params": params,
            "outcome": outcome,
        });
        let path = self
            .traces_dir
            .join(format!("trace_{query_index}_{decision_point}.json"));
        write_json_pretty(&path, &event)
    }
}
