//! In-memory batch/task store.
//!
//! All mutation goes through this store, behind a single async mutex, so
//! the drain loop and the completion controller never race on a task: a
//! task is claimed (pending → uploading) in the same critical section that
//! selects it, and can therefore never be picked up twice or paused while
//! being handed to a transfer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::error::UploadError;
use crate::models::{BatchProgress, DocumentBatch, TaskStatus, UploadTask};

/// Shared handle to the batch collection.
#[derive(Clone)]
pub struct BatchStore {
    batches: Arc<Mutex<HashMap<String, DocumentBatch>>>,
}

impl BatchStore {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a batch created by the external collaborator.
    pub async fn insert_batch(&self, batch_id: &str, patient_id: &str) {
        let mut batches = self.batches.lock().await;
        batches.insert(
            batch_id.to_string(),
            DocumentBatch::new(batch_id, patient_id),
        );
    }

    /// Append a pending task to its batch, preserving enqueue order.
    pub async fn enqueue_task(
        &self,
        patient_id: &str,
        batch_id: &str,
        payload: PathBuf,
        filename: &str,
    ) -> Result<UploadTask, UploadError> {
        let mut batches = self.batches.lock().await;
        let batch = batches
            .get_mut(batch_id)
            .ok_or_else(|| UploadError::BatchNotFound(batch_id.to_string()))?;
        let task = UploadTask::new(patient_id, batch_id, payload, filename);
        batch.tasks.push(task.clone());
        Ok(task)
    }

    /// Claim the oldest pending task: flip it to uploading and return a
    /// snapshot. The flip happens under the lock, so a task is never
    /// selected twice.
    pub async fn claim_next_pending(&self) -> Option<UploadTask> {
        let mut batches = self.batches.lock().await;
        let candidate = batches
            .values_mut()
            .flat_map(|b| b.tasks.iter_mut())
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by_key(|t| t.created_at)?;
        candidate.mark_uploading();
        Some(candidate.clone())
    }

    pub async fn set_task_progress(&self, batch_id: &str, task_id: &str, progress: f32) {
        let mut batches = self.batches.lock().await;
        if let Some(task) = find_task(&mut batches, batch_id, task_id) {
            task.set_progress(progress);
        }
    }

    pub async fn complete_task(&self, batch_id: &str, task_id: &str, document_id: String) {
        let mut batches = self.batches.lock().await;
        if let Some(task) = find_task(&mut batches, batch_id, task_id) {
            task.mark_completed(document_id);
        }
    }

    pub async fn fail_task(&self, batch_id: &str, task_id: &str, error: String) {
        let mut batches = self.batches.lock().await;
        if let Some(task) = find_task(&mut batches, batch_id, task_id) {
            task.mark_failed(error);
        }
    }

    /// Flip all pending tasks to paused. Returns the ids flipped.
    pub async fn pause_pending(&self) -> Vec<(String, String)> {
        let mut batches = self.batches.lock().await;
        let mut flipped = Vec::new();
        for batch in batches.values_mut() {
            for task in batch.tasks.iter_mut() {
                if task.status == TaskStatus::Pending {
                    task.mark_paused();
                    flipped.push((batch.batch_id.clone(), task.id.clone()));
                }
            }
        }
        flipped
    }

    /// Flip all paused tasks back to pending. Returns the ids flipped.
    pub async fn resume_paused(&self) -> Vec<(String, String)> {
        let mut batches = self.batches.lock().await;
        let mut flipped = Vec::new();
        for batch in batches.values_mut() {
            for task in batch.tasks.iter_mut() {
                if task.status == TaskStatus::Paused {
                    task.mark_pending();
                    flipped.push((batch.batch_id.clone(), task.id.clone()));
                }
            }
        }
        flipped
    }

    /// Reset a failed task for another attempt.
    pub async fn retry_task(&self, task_id: &str) -> Result<UploadTask, UploadError> {
        let mut batches = self.batches.lock().await;
        let task = batches
            .values_mut()
            .flat_map(|b| b.tasks.iter_mut())
            .find(|t| t.id == task_id)
            .ok_or_else(|| UploadError::TaskNotFound(task_id.to_string()))?;
        if task.status != TaskStatus::Failed {
            return Err(UploadError::InvalidRetry {
                id: task_id.to_string(),
                status: task.status,
            });
        }
        task.reset_for_retry();
        Ok(task.clone())
    }

    pub async fn has_pending(&self) -> bool {
        let batches = self.batches.lock().await;
        batches
            .values()
            .flat_map(|b| b.tasks.iter())
            .any(|t| t.status == TaskStatus::Pending)
    }

    pub async fn batch(&self, batch_id: &str) -> Option<DocumentBatch> {
        let batches = self.batches.lock().await;
        batches.get(batch_id).cloned()
    }

    pub async fn progress(&self, batch_id: &str) -> Option<BatchProgress> {
        let batches = self.batches.lock().await;
        batches.get(batch_id).map(|b| b.progress())
    }

    pub async fn task(&self, task_id: &str) -> Option<UploadTask> {
        let batches = self.batches.lock().await;
        batches
            .values()
            .flat_map(|b| b.tasks.iter())
            .find(|t| t.id == task_id)
            .cloned()
    }

    /// Record finalization once. The check and the write share the lock,
    /// so racing finalizers converge on one record: the first write wins
    /// and is returned with `false` to the loser.
    pub async fn mark_batch_completed(
        &self,
        batch_id: &str,
        artifact_ref: &str,
    ) -> Option<(String, bool)> {
        let mut batches = self.batches.lock().await;
        let batch = batches.get_mut(batch_id)?;
        if let Some(existing) = &batch.artifact_ref {
            return Some((existing.clone(), false));
        }
        batch.is_completed = true;
        batch.artifact_ref = Some(artifact_ref.to_string());
        Some((artifact_ref.to_string(), true))
    }

    /// Drop a batch once its artifact is durably stored elsewhere.
    pub async fn remove_batch(&self, batch_id: &str) -> Option<DocumentBatch> {
        let mut batches = self.batches.lock().await;
        batches.remove(batch_id)
    }
}

impl Default for BatchStore {
    fn default() -> Self {
        Self::new()
    }
}

fn find_task<'a>(
    batches: &'a mut HashMap<String, DocumentBatch>,
    batch_id: &str,
    task_id: &str,
) -> Option<&'a mut UploadTask> {
    batches
        .get_mut(batch_id)?
        .tasks
        .iter_mut()
        .find(|t| t.id == task_id)
}
