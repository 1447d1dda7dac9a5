//! Ingestion pipeline: parse -> validate -> save, optionally emitting a run
//! directory with config, outputs, manifest, and decision traces.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::artifact::write_manifest;
use crate::cli::{IngestArgs, InputFormat};
use crate::model::RunManifest;
use crate::parsers::{parse_csv, parse_json};
use crate::storage::open_storage;
use crate::trace::TraceWriter;
use crate::util::{ensure_directory, sha256_hex, utc_compact_string, write_json_pretty};
use crate::validation::{ValidationRules, validate};

const DEFAULT_STORAGE_PATH: &str = "data/ingested.db";

pub fn run(args: IngestArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read input: {}", args.input.display()))?;

    let rules = ValidationRules {
        required: args.required.clone(),
        int_fields: args.int_fields.clone(),
        min_count: args.min_count,
    };

    let run_dir = match (&args.exp_name, args.dry_run) {
        (Some(name), false) => Some(create_run_dir(&args.runs_root, name)?),
        _ => None,
    };
    let tracer = match &run_dir {
        Some(dir) => Some(TraceWriter::create(dir)?),
        None => None,
    };

    let records = ingest_records(
        &raw,
        args.format,
        args.normalize_keys,
        args.skip_validation,
        &rules,
        tracer.as_ref(),
    )?;

    if let Some(run_dir) = &run_dir {
        let config = json!({
            "format": args.format.as_str(),
            "order": "query_index",
            "normalize_keys": args.normalize_keys,
            "skip_validation": args.skip_validation,
        });
        write_json_pretty(&run_dir.join("config.json"), &config)?;
        write_json_pretty(&run_dir.join("outputs.json"), &records)?;

        let provenance = format!(
            "{} (sha256 {})",
            args.input.display(),
            &sha256_hex(raw.as_bytes())[..12]
        );
        write_manifest(run_dir, &RunManifest::new(config, provenance))?;
        info!(run_dir = %run_dir.display(), "wrote run directory");
    }

    if args.dry_run {
        info!(record_count = records.len(), "dry-run: nothing written");
        return Ok(());
    }

    let storage_path = args
        .storage_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH));
    if let Some(tracer) = &tracer {
        tracer.emit(
            0,
            "storage_selection",
            json!({"backend": args.storage.as_str()}),
            args.storage.as_str(),
        )?;
    }
    let mut storage = open_storage(args.storage, Some(&storage_path))?;
    storage.save(&records)?;

    info!(
        record_count = records.len(),
        storage = args.storage.as_str(),
        "ingested records"
    );

    Ok(())
}

/// Parse, optionally lowercase top-level keys, validate (unless skipped).
/// Decision points are traced when a writer is attached.
pub fn ingest_records(
    raw: &str,
    format: InputFormat,
    normalize_keys: bool,
    skip_validation: bool,
    rules: &ValidationRules,
    tracer: Option<&TraceWriter>,
) -> Result<Vec<Value>> {
    if let Some(tracer) = tracer {
        tracer.emit(
            0,
            "format_selection",
            json!({"format": format.as_str()}),
            format.as_str(),
        )?;
    }

    let mut records = match format {
        InputFormat::Json => parse_json(raw)?,
        InputFormat::Csv => parse_csv(raw)?,
    };

    if normalize_keys {
        records = records.into_iter().map(lowercase_top_level_keys).collect();
    }

    let validation_params = json!({
        "skip_validation": skip_validation,
        "required": rules.required,
        "int_fields": rules.int_fields,
        "min_count": rules.min_count,
    });
    if skip_validation {
        if let Some(tracer) = tracer {
            tracer.emit(0, "validation", validation_params, "skipped")?;
        }
    } else {
        validate(&records, rules).map_err(anyhow::Error::new)?;
        if let Some(tracer) = tracer {
            tracer.emit(0, "validation", validation_params, "passed")?;
        }
    }

    Ok(records)
}

fn lowercase_top_level_keys(record: Value) -> Value {
    match record {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.to_lowercase(), value);
            }
            Value::Object(out)
        }
        other => other,
    }
}

fn create_run_dir(runs_root: &Path, exp_name: &str) -> Result<PathBuf> {
    let run_dir = runs_root.join(format!("{}_{exp_name}", utc_compact_string(Utc::now())));
    ensure_directory(&run_dir)?;
    Ok(run_dir)
}
