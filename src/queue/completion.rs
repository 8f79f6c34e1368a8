//! Batch finalization: turning a capture session into an artifact.
//!
//! The nurse station ends a capture session with one call. The wait
//! policy lets in-flight transfers finish, bounded by a timeout; the
//! force policy proceeds immediately with whatever completed. Either way
//! the artifact is generated from completed documents only, and a
//! successful finalization advances the visit to `ready_for_doctor`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use super::error::CompletionError;
use super::store::BatchStore;
use crate::backend::ClinicBackend;
use crate::config::CompletionConfig;
use crate::events::{EventBus, WorkflowEvent};
use crate::models::BatchProgress;
use crate::visit::VisitStatusMachine;

/// How to treat tasks that are not yet terminal at finalization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Wait for in-flight and pending transfers, up to the configured
    /// timeout, then degrade to force.
    Wait,
    /// Finalize immediately with the completed subset.
    Force,
}

/// Outcome of a finalization call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReport {
    pub batch_id: String,
    pub artifact_ref: String,
    pub completed: usize,
    pub failed: usize,
    /// Tasks left non-terminal at finalization time. Zero unless forced.
    pub pending: usize,
    /// True when finalization proceeded while tasks were still pending.
    pub forced: bool,
}

#[derive(Clone)]
pub struct BatchCompletionController {
    backend: Arc<dyn ClinicBackend>,
    store: BatchStore,
    visits: VisitStatusMachine,
    events: EventBus<WorkflowEvent>,
    config: Arc<CompletionConfig>,
}

impl BatchCompletionController {
    pub fn new(
        backend: Arc<dyn ClinicBackend>,
        store: BatchStore,
        visits: VisitStatusMachine,
        events: EventBus<WorkflowEvent>,
        config: CompletionConfig,
    ) -> Self {
        Self {
            backend,
            store,
            visits,
            events,
            config: Arc::new(config),
        }
    }

    /// Finalize a batch and advance the visit identified by `queue_id`.
    ///
    /// Calling again on an already-finalized batch returns the recorded
    /// artifact reference without regenerating anything. Failures before
    /// the artifact is recorded leave the batch untouched, so the call is
    /// retryable.
    pub async fn complete_batch(
        &self,
        batch_id: &str,
        queue_id: &str,
        policy: CompletionPolicy,
    ) -> Result<CompletionReport, CompletionError> {
        let batch = self
            .store
            .batch(batch_id)
            .await
            .ok_or_else(|| CompletionError::BatchNotFound(batch_id.to_string()))?;

        if batch.is_completed {
            if let Some(artifact_ref) = batch.artifact_ref.clone() {
                tracing::debug!(batch_id, artifact_ref, "Batch already finalized");
                let progress = batch.progress();
                return Ok(CompletionReport {
                    batch_id: batch_id.to_string(),
                    artifact_ref,
                    completed: progress.completed,
                    failed: progress.failed,
                    pending: progress.pending,
                    forced: false,
                });
            }
        }

        if policy == CompletionPolicy::Wait {
            self.wait_for_drain(batch_id).await;
        }

        // Snapshot after any waiting; this is the set we finalize with.
        let batch = self
            .store
            .batch(batch_id)
            .await
            .ok_or_else(|| CompletionError::BatchNotFound(batch_id.to_string()))?;
        let snapshot = batch.progress();
        let document_ids = batch.completed_document_ids();

        if document_ids.is_empty() {
            return Err(CompletionError::EmptyBatch(batch_id.to_string()));
        }

        let forced = snapshot.pending > 0;
        if forced {
            tracing::warn!(
                batch_id,
                pending = snapshot.pending,
                failed = snapshot.failed,
                "Finalizing with non-terminal tasks remaining"
            );
        }

        let artifact = self
            .backend
            .generate_artifact(&batch.patient_id, batch_id, &document_ids)
            .await?;

        // Generation may take a while; report the counts as they stand at
        // record time, not as they were when the snapshot was taken.
        let progress = self
            .store
            .progress(batch_id)
            .await
            .ok_or_else(|| CompletionError::BatchNotFound(batch_id.to_string()))?;

        let (artifact_ref, recorded) = self
            .store
            .mark_batch_completed(batch_id, &artifact.id)
            .await
            .ok_or_else(|| CompletionError::BatchNotFound(batch_id.to_string()))?;

        if !recorded {
            // Another finalizer won the race; its record stands.
            tracing::debug!(batch_id, artifact_ref, "Batch finalized concurrently");
            return Ok(CompletionReport {
                batch_id: batch_id.to_string(),
                artifact_ref,
                completed: progress.completed,
                failed: progress.failed,
                pending: progress.pending,
                forced: false,
            });
        }

        tracing::info!(
            batch_id,
            artifact_ref,
            documents = document_ids.len(),
            "Batch finalized"
        );

        // A cancelled visit must not block the artifact; log and move on.
        if let Err(e) = self.visits.mark_ready_for_doctor(queue_id).await {
            tracing::warn!(queue_id, error = %e, "Visit did not advance to ready_for_doctor");
        }

        self.events.send(WorkflowEvent::BatchCompleted {
            batch_id: batch_id.to_string(),
            patient_id: batch.patient_id.clone(),
            artifact_ref: artifact_ref.clone(),
            completed: progress.completed,
            failed: progress.failed,
            pending: progress.pending,
        });

        Ok(CompletionReport {
            batch_id: batch_id.to_string(),
            artifact_ref,
            completed: progress.completed,
            failed: progress.failed,
            pending: progress.pending,
            forced,
        })
    }

    /// Poll until no pending tasks remain or the wait budget runs out.
    async fn wait_for_drain(&self, batch_id: &str) {
        let deadline = Instant::now() + self.config.wait_timeout;
        loop {
            let pending = self
                .store
                .progress(batch_id)
                .await
                .map(|p: BatchProgress| p.pending)
                .unwrap_or(0);
            if pending == 0 {
                return;
            }
            if Instant::now() >= deadline {
                tracing::warn!(batch_id, pending, "Wait budget exhausted, degrading to force");
                return;
            }
            sleep(self.config.poll_granularity).await;
        }
    }
}
