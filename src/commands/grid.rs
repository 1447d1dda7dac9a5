//! Counterfactual grid runner: re-ingest a base run's raw input with one
//! config knob flipped at a time and index which knobs change the output.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::{GridArgs, InputFormat};
use crate::commands::ingest::ingest_records;
use crate::util::{ensure_directory, read_json_value, sha256_hex, utc_compact_string, write_json_pretty};
use crate::validation::ValidationRules;

/// Config knobs flipped one at a time.
const KNOBS: [&str; 4] = ["format", "order", "normalize_keys", "skip_validation"];

const OUTPUT_HASH_CHARS: usize = 12;

#[derive(Debug, Serialize)]
struct VariantEntry {
    name: String,
    knob: Option<String>,
    value: Option<Value>,
    output_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    differs_from_baseline: Option<bool>,
}

#[derive(Debug, Serialize)]
struct GridSummary {
    total: usize,
    output_diffs: usize,
}

#[derive(Debug, Serialize)]
struct GridIndex {
    grid_id: String,
    base_run: String,
    variants: Vec<VariantEntry>,
    summary: GridSummary,
}

pub fn run(args: GridArgs) -> Result<()> {
    if !args.base_run.exists() {
        bail!("base run not found: {}", args.base_run.display());
    }

    let base_config = read_json_value(&args.base_run.join("config.json"))?;
    let raw_input = load_raw_input(&args.base_run)?;

    let base_outputs = run_variant(&raw_input, &base_config)?;
    let base_hash = output_hash(&base_outputs)?;

    let grid_id = format!("{}_grid", utc_compact_string(Utc::now()));
    let grid_dir = args.runs_root.join(&grid_id);
    ensure_directory(&grid_dir)?;

    let mut variants = Vec::with_capacity(KNOBS.len() + 1);

    let baseline_dir = grid_dir.join("baseline");
    write_json_pretty(&baseline_dir.join("config.json"), &base_config)?;
    write_json_pretty(&baseline_dir.join("outputs.json"), &base_outputs)?;
    variants.push(VariantEntry {
        name: "baseline".to_string(),
        knob: None,
        value: None,
        output_hash: base_hash.clone(),
        differs_from_baseline: None,
    });

    let mut diff_count = 0;
    for knob in KNOBS {
        let flipped = flip_knob(&base_config, knob);
        let mut variant_config = base_config.clone();
        variant_config
            .as_object_mut()
            .context("base config must be a json object")?
            .insert(knob.to_string(), flipped.clone());

        let variant_name = format!("{knob}_{}", value_label(&flipped));
        let variant_dir = grid_dir.join(&variant_name);
        write_json_pretty(&variant_dir.join("config.json"), &variant_config)?;

        let variant_outputs = match run_variant(&raw_input, &variant_config) {
            Ok(outputs) => outputs,
            Err(error) => {
                warn!(variant = %variant_name, error = %error, "variant ingest failed");
                Vec::new()
            }
        };
        write_json_pretty(&variant_dir.join("outputs.json"), &variant_outputs)?;

        let variant_hash = output_hash(&variant_outputs)?;
        let differs = variant_hash != base_hash;
        if differs {
            diff_count += 1;
        }
        variants.push(VariantEntry {
            name: variant_name,
            knob: Some(knob.to_string()),
            value: Some(flipped),
            output_hash: variant_hash,
            differs_from_baseline: Some(differs),
        });
    }

    let index = GridIndex {
        grid_id: grid_id.clone(),
        base_run: args.base_run.display().to_string(),
        summary: GridSummary {
            total: variants.len(),
            output_diffs: diff_count,
        },
        variants,
    };
    write_json_pretty(&grid_dir.join("index.json"), &index)?;

    let summary_text = format!(
        "Counterfactual grid report: {grid_id}\n\
         Base run: {}\n\
         Variants: {}\n\
         Knobs flipped: {KNOBS:?}\n\
         Output diffs from baseline: {diff_count}/{}\n\
         Index: {}\n",
        args.base_run.display(),
        index.summary.total,
        KNOBS.len(),
        grid_dir.join("index.json").display(),
    );
    fs::write(grid_dir.join("summary.txt"), &summary_text)
        .with_context(|| format!("failed to write summary in {}", grid_dir.display()))?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    output.write_all(summary_text.as_bytes())?;
    output.flush()?;

    info!(grid_dir = %grid_dir.display(), output_diffs = diff_count, "grid completed");
    Ok(())
}

/// The raw input for re-ingestion: `input.json`, then `raw_input.json`, then
/// the existing pipeline output as a fallback.
fn load_raw_input(base_run: &Path) -> Result<String> {
    for candidate in ["input.json", "raw_input.json", "outputs.json"] {
        let path = base_run.join(candidate);
        if path.exists() {
            return fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()));
        }
    }
    bail!(
        "no input file found in {}; expected input.json, raw_input.json, or outputs.json",
        base_run.display()
    );
}

/// Re-run the ingestion pipeline under a variant config. The `order` knob is
/// carried in config but not consumed by the pipeline.
fn run_variant(raw_input: &str, config: &Value) -> Result<Vec<Value>> {
    let format = match config.get("format").and_then(Value::as_str) {
        Some("csv") => InputFormat::Csv,
        _ => InputFormat::Json,
    };
    let normalize_keys = config
        .get("normalize_keys")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let skip_validation = config
        .get("skip_validation")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    ingest_records(
        raw_input,
        format,
        normalize_keys,
        skip_validation,
        &ValidationRules::default(),
        None,
    )
}

fn flip_knob(config: &Value, knob: &str) -> Value {
    let current = config.get(knob);
    match knob {
        "format" => {
            if current.and_then(Value::as_str) == Some("json") {
                Value::from("csv")
            } else {
                Value::from("json")
            }
        }
        "order" => {
            if current.and_then(Value::as_str) == Some("query_index") {
                Value::from("timestamp")
            } else {
                Value::from("query_index")
            }
        }
        _ => Value::from(!current.and_then(Value::as_bool).unwrap_or(false)),
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Hash of the canonical (sorted-key) JSON form of the outputs.
fn output_hash(records: &[Value]) -> Result<String> {
    let canonical =
        serde_json::to_string(records).context("failed to serialize outputs for hashing")?;
    Ok(sha256_hex(canonical.as_bytes())[..OUTPUT_HASH_CHARS].to_string())
}
