//! Queue-side error types.
//!
//! Task-level failures are recorded on the task and recovered via retry;
//! these enums cover the batch-level failures that surface to callers.

use thiserror::Error;

use crate::backend::BackendError;
use crate::models::TaskStatus;

#[derive(Debug, Error)]
pub enum UploadError {
    /// The external registration call failed; no local batch exists.
    /// The caller must retry.
    #[error("Batch creation failed: {0}")]
    BatchCreation(#[source] BackendError),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Retry is only valid on failed tasks.
    #[error("Cannot retry task {id}: status is {status}")]
    InvalidRetry { id: String, status: TaskStatus },
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    /// No completed documents; there is nothing to generate an artifact
    /// from. The batch is left unaffected.
    #[error("Batch {0} has no completed documents")]
    EmptyBatch(String),

    /// The external generation call failed; the batch is left unaffected
    /// and the call is retryable.
    #[error("Artifact generation failed: {0}")]
    ArtifactGeneration(#[from] BackendError),
}
