use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "runlab",
    version,
    about = "Local run-artifact analysis and eval scoring tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse, validate, and store records; optionally emit a run directory
    Ingest(IngestArgs),
    /// Tabulate run manifests under a runs root
    ListRuns(ListRunsArgs),
    /// Summarize one run: schema, ordering, trace inventory
    Probe(ProbeArgs),
    /// Flag numeric-looking strings and coercion risk in run outputs
    TypeProbe(TypeProbeArgs),
    /// Compare two runs and judge whether traces explain output diffs
    Explain(ExplainArgs),
    /// Score model answers against an eval bundle
    Score(ScoreArgs),
    /// Re-ingest a base run under one-knob-flipped configs
    Grid(GridArgs),
    /// Metamorphic checks over existing runs
    Check(CheckArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum InputFormat {
    Json,
    Csv,
}

impl InputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Input file (JSON or CSV)
    pub input: PathBuf,

    #[arg(long, value_enum)]
    pub format: InputFormat,

    #[arg(long, value_enum, default_value_t = StorageBackend::Memory)]
    pub storage: StorageBackend,

    #[arg(long)]
    pub storage_path: Option<PathBuf>,

    #[arg(long, default_value = "runs")]
    pub runs_root: PathBuf,

    /// Write a run directory <runs-root>/<timestamp>_<name>/
    #[arg(long)]
    pub exp_name: Option<String>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value_t = false)]
    pub normalize_keys: bool,

    #[arg(long, default_value_t = false)]
    pub skip_validation: bool,

    /// Required record fields (repeatable)
    #[arg(long = "required")]
    pub required: Vec<String>,

    /// Fields that must be int-coercible (repeatable)
    #[arg(long = "int-field")]
    pub int_fields: Vec<String>,

    #[arg(long)]
    pub min_count: Option<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct ListRunsArgs {
    #[arg(long, default_value = "runs")]
    pub runs_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    pub run_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct TypeProbeArgs {
    pub run_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ExplainArgs {
    pub run_a: PathBuf,
    pub run_b: PathBuf,

    /// Also write <DIR>/explainability_report.json
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Cap each reported diff list (judgment always uses the full lists)
    #[arg(long)]
    pub max_diffs: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    pub bundle_dir: PathBuf,
    pub answers_file: PathBuf,

    /// Output score file; relative paths resolve inside the bundle dir
    #[arg(short, long, default_value = "score.json")]
    pub output: PathBuf,

    /// Code evidence is allowed (disables the overconfidence penalty)
    #[arg(long, default_value_t = false)]
    pub code_allowed: bool,
}

#[derive(Args, Debug, Clone)]
pub struct GridArgs {
    pub base_run: PathBuf,

    #[arg(long, default_value = "runs")]
    pub runs_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Single run to check; defaults to every run under the runs root
    pub run_path: Option<PathBuf>,

    #[arg(long, default_value = "runs")]
    pub runs_root: PathBuf,

    #[arg(long)]
    pub out: Option<PathBuf>,
}
