//! Scan a runs root and print a table of run manifests.

use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::artifact::read_manifest;
use crate::cli::ListRunsArgs;

const PROVENANCE_MAX_CHARS: usize = 40;

struct RunRow {
    run: String,
    format: String,
    order: String,
    trace_schema: String,
    norm_version: String,
    provenance: String,
}

pub fn run(args: ListRunsArgs) -> Result<()> {
    if !args.runs_root.is_dir() {
        bail!("runs directory not found: {}", args.runs_root.display());
    }

    let mut run_dirs = Vec::new();
    let entries = fs::read_dir(&args.runs_root)
        .with_context(|| format!("failed to read {}", args.runs_root.display()))?;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", args.runs_root.display()))?;
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if path.is_dir() && !hidden {
            run_dirs.push(path);
        }
    }
    run_dirs.sort();

    let mut rows = Vec::with_capacity(run_dirs.len());
    for run_dir in &run_dirs {
        let name = run_dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        let row = match read_manifest(run_dir)? {
            Some(manifest) => {
                let config_field = |key: &str| {
                    manifest
                        .config
                        .get(key)
                        .and_then(|value| value.as_str())
                        .unwrap_or("-")
                        .to_string()
                };
                RunRow {
                    run: name,
                    format: config_field("format"),
                    order: config_field("order"),
                    trace_schema: manifest.trace_schema().unwrap_or("unknown").to_string(),
                    norm_version: manifest
                        .normalize_output_version
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    provenance: truncate_chars(&manifest.input_provenance, PROVENANCE_MAX_CHARS),
                }
            }
            None => RunRow {
                run: name,
                format: "-".to_string(),
                order: "-".to_string(),
                trace_schema: "no manifest".to_string(),
                norm_version: "-".to_string(),
                provenance: "-".to_string(),
            },
        };
        rows.push(row);
    }

    if rows.is_empty() {
        info!(runs_root = %args.runs_root.display(), "no runs found");
        return Ok(());
    }

    print_table(&rows)?;
    info!(run_count = rows.len(), "listed runs");
    Ok(())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.is_empty() {
        return "-".to_string();
    }
    text.chars().take(max_chars).collect()
}

fn print_table(rows: &[RunRow]) -> Result<()> {
    let w_run = column_width(rows, 8, |row| &row.run);
    let w_format = column_width(rows, 6, |row| &row.format);
    let w_order = column_width(rows, 5, |row| &row.order);
    let w_trace = column_width(rows, 10, |row| &row.trace_schema);
    let w_norm = column_width(rows, 8, |row| &row.norm_version);

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(
        output,
        "{:<w_run$} {:<w_format$} {:<w_order$} {:<w_trace$} {:<w_norm$} provenance",
        "run", "format", "order", "trace_ver", "norm_ver",
    )?;
    writeln!(
        output,
        "{}",
        "-".repeat(w_run + w_format + w_order + w_trace + w_norm + 15)
    )?;
    for row in rows {
        writeln!(
            output,
            "{:<w_run$} {:<w_format$} {:<w_order$} {:<w_trace$} {:<w_norm$} {}",
            row.run, row.format, row.order, row.trace_schema, row.norm_version, row.provenance,
        )?;
    }
    output.flush()?;
    Ok(())
}

fn column_width(rows: &[RunRow], min: usize, field: impl Fn(&RunRow) -> &str) -> usize {
    rows.iter()
        .map(|row| field(row).chars().count())
        .max()
        .unwrap_or(0)
        .max(min)
}
