//! External collaborator seam: the cloud services the core drives.
//!
//! The content of AI extraction and the persistence technology behind these
//! calls are opaque to the core; only eventual success/failure and the
//! returned references matter. Implementations live outside this crate
//! (HTTP glue); tests use in-memory mocks.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Artifact;

/// Incremental transfer progress callback, invoked with values in [0, 1].
pub type ProgressFn = dyn Fn(f32) + Send + Sync;

/// Result of uploading one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub document_id: String,
    /// Extraction may run synchronously on the remote side; if it did,
    /// the structured output rides along.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<serde_json::Value>,
}

/// Errors surfaced by collaborator calls.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transient transport failure; the operation is retryable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service rejected the request; retrying without
    /// changing it will not help.
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    /// The referenced remote entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// The collaborator operations the core consumes.
///
/// Visit status transitions go through [`crate::visit::VisitStore`], the
/// authoritative store for the consultation mutual-exclusion guard.
#[async_trait]
pub trait ClinicBackend: Send + Sync {
    /// Create a new remote batch for a patient visit. Each call creates a
    /// new batch; idempotency is not guaranteed by the caller.
    async fn register_batch(&self, patient_id: &str) -> Result<String, BackendError>;

    /// Transfer one document. `progress` is invoked with incremental
    /// values; the final 1.0 is implied by a successful return.
    async fn upload_document(
        &self,
        patient_id: &str,
        batch_id: &str,
        payload: &Path,
        filename: &str,
        progress: &ProgressFn,
    ) -> Result<UploadReceipt, BackendError>;

    /// Generate the downstream artifact from the completed documents.
    /// May take tens of seconds; callers must not block a user-facing
    /// task on it.
    async fn generate_artifact(
        &self,
        patient_id: &str,
        batch_id: &str,
        document_ids: &[String],
    ) -> Result<Artifact, BackendError>;

    /// Fetch the latest artifact for a patient, if any was generated.
    async fn get_artifact(&self, patient_id: &str) -> Result<Option<Artifact>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_is_object_safe() {
        fn _assert(_: &dyn ClinicBackend) {}
    }

    #[test]
    fn backend_error_display() {
        let e = BackendError::Transport("connection reset".to_string());
        assert_eq!(e.to_string(), "Transport error: connection reset");
        let e = BackendError::NotFound("patient PT_9".to_string());
        assert!(e.to_string().contains("PT_9"));
    }

    #[test]
    fn upload_receipt_serde_skips_absent_extraction() {
        let receipt = UploadReceipt {
            document_id: "DOC_1".to_string(),
            extracted_data: None,
        };
        let json = serde_json::to_string(&receipt).unwrap();
        assert!(!json.contains("extracted_data"));
    }
}
