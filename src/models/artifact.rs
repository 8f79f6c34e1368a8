//! Artifact: the structured output generated when a batch is finalized.
//!
//! The content is produced by an external AI collaborator; this crate only
//! carries the record through the pipeline and fingerprints it for sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single event on the generated medical timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub date: String,
    pub event_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// The generated artifact for one finalized batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub patient_id: String,
    pub batch_id: String,
    pub generated_at: DateTime<Utc>,
    pub events: Vec<TimelineEvent>,
    #[serde(default)]
    pub current_medications: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    pub summary: String,
    /// How many source documents went into this artifact.
    pub total_documents: usize,
}

impl Artifact {
    /// Content fingerprint used by the live sync client to suppress
    /// redundant notifications: artifact id plus summary length.
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.id, self.summary.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_artifact(id: &str, summary: &str) -> Artifact {
        Artifact {
            id: id.to_string(),
            patient_id: "PT_1".to_string(),
            batch_id: "BATCH_1".to_string(),
            generated_at: Utc::now(),
            events: vec![],
            current_medications: vec![],
            chronic_conditions: vec![],
            summary: summary.to_string(),
            total_documents: 2,
        }
    }

    #[test]
    fn fingerprint_changes_with_id() {
        let a = make_artifact("ART_1", "stable summary");
        let b = make_artifact("ART_2", "stable summary");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_summary_length() {
        let a = make_artifact("ART_1", "short");
        let b = make_artifact("ART_1", "a longer summary");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_stable_for_identical_content() {
        let a = make_artifact("ART_1", "same");
        let b = make_artifact("ART_1", "same");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn artifact_serde_roundtrip() {
        let artifact = Artifact {
            events: vec![TimelineEvent {
                date: "2026-08-01".to_string(),
                event_type: "prescription".to_string(),
                description: "Metformin 500mg started".to_string(),
                details: None,
            }],
            current_medications: vec!["Metformin 500mg".to_string()],
            chronic_conditions: vec!["Type 2 diabetes".to_string()],
            ..make_artifact("ART_1", "Patient has 2 prescription documents on file.")
        };
        let json = serde_json::to_string(&artifact).unwrap();
        let parsed: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, "ART_1");
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.current_medications.len(), 1);
    }
}
