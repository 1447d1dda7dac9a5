//! Score model answers against an eval bundle: correctness, underdetermined
//! handling, grounding compliance, overconfidence penalty, error taxonomy.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::cli::ScoreArgs;
use crate::util::write_json_pretty;

/// Hedge phrases counted as a "cannot infer" response, matched as
/// case-insensitive regex fragments against the normalized answer.
const HEDGE_PATTERNS: [&str; 10] = [
    r"cannot infer",
    r"can't infer",
    r"cannot determine",
    r"can't determine",
    r"not inferable",
    r"underdetermined",
    r"insufficient.*evidence",
    r"no.*evidence",
    r"unknown",
    r"unclear from artifacts",
];

/// Artifact-reference vocabulary an answer must touch to count as grounded.
const GROUNDING_TERMS: [&str; 8] = [
    "manifest",
    "trace",
    "outputs",
    "config",
    "explainability",
    "runs/",
    "normalization_note",
    "report",
];

/// Mechanistic-claim patterns that draw the overconfidence penalty when code
/// evidence is disallowed.
const OVERCONFIDENT_PATTERNS: [&str; 6] = [
    r"the code does",
    r"the function",
    r"the implementation",
    r"line [0-9]+",
    r"def ",
    r"because the model",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub expected_answer: String,
    #[serde(default = "default_expected_label")]
    pub expected_label: String,
    #[serde(default)]
    pub underdetermined: bool,
    #[serde(default)]
    pub evidence_pointers: Vec<String>,
}

fn default_expected_label() -> String {
    "INFERABLE".to_string()
}

impl Question {
    pub fn is_underdetermined(&self) -> bool {
        self.underdetermined || self.expected_label == "UNDERDETERMINED"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bundle {
    pub questions: Vec<Question>,
}

/// Fixed error taxonomy for incorrect, inferable answers.
///
/// `WrongArtifactRetrieval` and `UncertaintyCalibrationError` are part of
/// the taxonomy for report-schema stability but are not produced by the
/// classification heuristic.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    MissingEvidenceHallucination,
    WrongArtifactRetrieval,
    WrongInferenceFromCorrectArtifact,
    NormalizationConfusion,
    UncertaintyCalibrationError,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingEvidenceHallucination => "missing_evidence_hallucination",
            Self::WrongArtifactRetrieval => "wrong_artifact_retrieval",
            Self::WrongInferenceFromCorrectArtifact => "wrong_inference_from_correct_artifact",
            Self::NormalizationConfusion => "normalization_confusion",
            Self::UncertaintyCalibrationError => "uncertainty_calibration_error",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScoreResult {
    pub question_id: String,
    pub correctness: bool,
    pub underdetermined_handling: Option<bool>,
    pub grounding_compliant: bool,
    pub overconfident_penalty: u32,
    pub error_category: Option<ErrorCategory>,
}

#[derive(Debug, Serialize)]
pub struct ScoreSummary {
    pub total: usize,
    pub correct: usize,
    pub correctness_rate: f64,
    pub underdetermined_handled: usize,
    pub grounding_compliant: usize,
    pub overconfident_penalties: u32,
}

#[derive(Debug, Serialize)]
pub struct ScoreReport {
    pub bundle: String,
    pub answers_file: String,
    pub summary: ScoreSummary,
    pub per_question: Vec<ScoreResult>,
    pub error_categories: BTreeMap<String, usize>,
}

pub fn run(args: ScoreArgs) -> Result<()> {
    let bundle_path = args.bundle_dir.join("bundle.json");
    if !bundle_path.exists() {
        bail!("bundle not found: {}", bundle_path.display());
    }
    if !args.answers_file.exists() {
        bail!("answers file not found: {}", args.answers_file.display());
    }

    let raw = fs::read(&bundle_path)
        .with_context(|| format!("failed to read {}", bundle_path.display()))?;
    let bundle: Bundle = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", bundle_path.display()))?;

    let answers = load_answers(&args.answers_file)?;
    let report = score_bundle(&bundle, &answers, &args)?;

    let output_path = if args.output.is_absolute() {
        args.output.clone()
    } else {
        args.bundle_dir.join(&args.output)
    };
    write_json_pretty(&output_path, &report)?;

    info!(path = %output_path.display(), "wrote score report");
    info!(
        correct = report.summary.correct,
        total = report.summary.total,
        "scoring completed"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &report)
        .context("failed to serialize score report to stdout")?;
    writeln!(output)?;
    output.flush()?;

    Ok(())
}

fn score_bundle(
    bundle: &Bundle,
    answers: &BTreeMap<String, String>,
    args: &ScoreArgs,
) -> Result<ScoreReport> {
    let mut per_question = Vec::with_capacity(bundle.questions.len());
    for question in &bundle.questions {
        let answer = answers.get(&question.id).map(String::as_str).unwrap_or("");
        per_question.push(score_answer(question, answer, args.code_allowed)?);
    }

    let correct = per_question.iter().filter(|r| r.correctness).count();
    let underdetermined_handled = per_question
        .iter()
        .filter(|r| r.underdetermined_handling == Some(true))
        .count();
    let grounding_compliant = per_question.iter().filter(|r| r.grounding_compliant).count();
    let overconfident_penalties = per_question.iter().map(|r| r.overconfident_penalty).sum();

    let mut error_categories = BTreeMap::new();
    for result in &per_question {
        if let Some(category) = result.error_category {
            *error_categories
                .entry(category.as_str().to_string())
                .or_insert(0) += 1;
        }
    }

    let total = per_question.len();
    Ok(ScoreReport {
        bundle: args
            .bundle_dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string(),
        answers_file: args.answers_file.display().to_string(),
        summary: ScoreSummary {
            total,
            correct,
            correctness_rate: if total > 0 {
                correct as f64 / total as f64
            } else {
                0.0
            },
            underdetermined_handled,
            grounding_compliant,
            overconfident_penalties,
        },
        per_question,
        error_categories,
    })
}

/// Score a single answer against its question.
pub fn score_answer(question: &Question, answer: &str, code_allowed: bool) -> Result<ScoreResult> {
    let said_cannot_infer = check_underdetermined_response(answer)?;

    let mut result = ScoreResult {
        question_id: question.id.clone(),
        correctness: false,
        underdetermined_handling: None,
        grounding_compliant: true,
        overconfident_penalty: 0,
        error_category: None,
    };

    if question.is_underdetermined() {
        result.underdetermined_handling = Some(said_cannot_infer);
        result.correctness = said_cannot_infer;
    } else {
        result.correctness = answers_match(&question.expected_answer, answer)?;
        if !result.correctness {
            result.error_category = Some(classify_error(&question.expected_answer, answer));
        }
    }

    result.grounding_compliant = check_grounding(answer, &question.evidence_pointers);
    if !code_allowed && check_overconfident_mechanistic(answer)? {
        result.overconfident_penalty = 1;
    }

    Ok(result)
}

/// Trim, lowercase, collapse internal whitespace.
fn normalize_answer(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for word in text.trim().split_whitespace() {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.push_str(&word.to_lowercase());
    }
    normalized
}

/// Secondary normalization for flexible matching: punctuation collapsed to
/// spaces.
fn normalize_for_match(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| {
            if matches!(c, ':' | '(' | ')' | ',' | ';') {
                ' '
            } else {
                c
            }
        })
        .collect();
    normalize_answer(&replaced)
}

/// Whether the actual answer matches the expected one. Short boolean-like
/// answers require a whole-word match so that "no" does not match inside
/// "normalization"; longer answers allow substring containment in either
/// direction, also under the punctuation-stripped form.
pub fn answers_match(expected: &str, actual: &str) -> Result<bool> {
    let ne = normalize_answer(expected);
    let na = normalize_answer(actual);
    if ne == na {
        return Ok(true);
    }
    if ne.is_empty() || na.is_empty() {
        return Ok(false);
    }

    if ne.len() <= 4 && matches!(ne.as_str(), "yes" | "no" | "true" | "false") {
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&ne)))
            .context("failed to compile short-answer boundary pattern")?;
        return Ok(pattern.is_match(&na));
    }

    if na.contains(&ne) || ne.contains(&na) {
        return Ok(true);
    }

    let ne2 = normalize_for_match(&ne);
    let na2 = normalize_for_match(&na);
    Ok(na2.contains(&ne2) || ne2.contains(&na2))
}

/// Whether the answer hedges with a "cannot infer" equivalent.
pub fn check_underdetermined_response(text: &str) -> Result<bool> {
    if text.is_empty() {
        return Ok(false);
    }
    let normalized = normalize_answer(text);
    for pattern in HEDGE_PATTERNS {
        let regex =
            Regex::new(pattern).with_context(|| format!("failed to compile hedge pattern: {pattern}"))?;
        if regex.is_match(&normalized) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Grounding compliance: no evidence pointers means no constraint; otherwise
/// the answer must touch at least one artifact-reference term.
fn check_grounding(text: &str, evidence_pointers: &[String]) -> bool {
    if text.is_empty() || evidence_pointers.is_empty() {
        return true;
    }
    let lowered = text.to_lowercase();
    GROUNDING_TERMS.iter().any(|term| lowered.contains(term))
}

/// Mechanistic internal-logic claims (code, functions, line numbers) that an
/// artifact-only answer has no evidence for.
fn check_overconfident_mechanistic(text: &str) -> Result<bool> {
    let lowered = text.to_lowercase();
    for pattern in OVERCONFIDENT_PATTERNS {
        let regex = Regex::new(pattern)
            .with_context(|| format!("failed to compile overconfidence pattern: {pattern}"))?;
        if regex.is_match(&lowered) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Error taxonomy heuristic for incorrect, inferable answers.
fn classify_error(expected: &str, actual: &str) -> ErrorCategory {
    if actual.is_empty() || normalize_answer(actual).contains("cannot infer") {
        return ErrorCategory::MissingEvidenceHallucination;
    }
    let combined = format!("{expected}{actual}").to_lowercase();
    if combined.contains("normaliz") || combined.contains("raw") || combined.contains("coerc") {
        return ErrorCategory::NormalizationConfusion;
    }
    ErrorCategory::WrongInferenceFromCorrectArtifact
}

/// Load model answers: a JSON object `{ "q1": "answer", ... }` or JSONL with
/// `id`/`question_id` and `answer`/`model_answer`/`response` per line.
pub fn load_answers(path: &Path) -> Result<BTreeMap<String, String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let content = content.trim();

    let mut answers = BTreeMap::new();
    if content.starts_with('{') {
        // A whole-file JSON object; JSONL lines also start with '{' but
        // fail to parse as one document and fall through.
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content) {
            for (key, value) in map {
                answers.insert(key, answer_text(&value));
            }
            return Ok(answers);
        }
    }

    for (line_index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(line).with_context(|| {
            format!("failed to parse {} line {}", path.display(), line_index + 1)
        })?;
        let id = record
            .get("id")
            .or_else(|| record.get("question_id"))
            .and_then(Value::as_str);
        let answer = record
            .get("answer")
            .or_else(|| record.get("model_answer"))
            .or_else(|| record.get("response"));
        if let Some(id) = id {
            answers.insert(id.to_string(), answer.map(answer_text).unwrap_or_default());
        }
    }
    Ok(answers)
}

fn answer_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
