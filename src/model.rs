use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::now_utc_string;

pub const NORMALIZE_OUTPUT_VERSION: &str = "1.0";
pub const TRACE_SCHEMA_VERSION: &str = "v2";

/// Run manifest: how the run was configured and where its input came from.
///
/// A historical producer wrote the misspelled key `trace_schemaversion`;
/// readers accept either spelling and prefer the correct one. The writer
/// only ever emits the correct key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub config: Value,
    #[serde(default)]
    pub input_provenance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_schema_version: Option<String>,
    #[serde(
        default,
        rename = "trace_schemaversion",
        skip_serializing_if = "Option::is_none"
    )]
    pub trace_schema_version_legacy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize_output_version: Option<String>,
}

impl RunManifest {
    pub fn new(config: Value, input_provenance: String) -> Self {
        Self {
            config,
            input_provenance,
            generated_at: Some(now_utc_string()),
            trace_schema_version: Some(TRACE_SCHEMA_VERSION.to_string()),
            trace_schema_version_legacy: None,
            normalize_output_version: Some(NORMALIZE_OUTPUT_VERSION.to_string()),
        }
    }

    /// Effective trace schema version, preferring the correctly spelled key.
    pub fn trace_schema(&self) -> Option<&str> {
        self.trace_schema_version
            .as_deref()
            .or(self.trace_schema_version_legacy.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_prefers_correctly_spelled_trace_schema_key() {
        let raw = r#"
        {
          "config": {"format": "json"},
          "input_provenance": "runs/a",
          "trace_schema_version": "v2",
          "trace_schemaversion": "v1",
          "normalize_output_version": "1.0"
        }
        "#;

        let manifest: RunManifest =
            serde_json::from_str(raw).expect("manifest with both keys should deserialize");
        assert_eq!(manifest.trace_schema(), Some("v2"));
    }

    #[test]
    fn manifest_accepts_legacy_misspelled_trace_schema_key() {
        let raw = r#"
        {
          "config": {},
          "input_provenance": "runs/b",
          "trace_schemaversion": "v1"
        }
        "#;

        let manifest: RunManifest =
            serde_json::from_str(raw).expect("legacy manifest should deserialize");
        assert_eq!(manifest.trace_schema(), Some("v1"));
        assert!(manifest.normalize_output_version.is_none());
    }

    #[test]
    fn new_manifest_serializes_only_the_correct_key() {
        let manifest = RunManifest::new(serde_json::json!({"format": "csv"}), "in.csv".to_string());
        let serialized = serde_json::to_string(&manifest).expect("manifest should serialize");
        assert!(serialized.contains("trace_schema_version"));
        assert!(!serialized.contains("trace_schemaversion"));
    }
}
