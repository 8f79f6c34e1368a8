//! Document batch: the set of captures belonging to one patient visit.
//!
//! The batch owns its tasks in insertion order (first-scanned documents are
//! drained first). Progress counts are derived on read, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{TaskStatus, UploadTask};

/// A batch of document uploads tied to one patient visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentBatch {
    pub batch_id: String,
    pub patient_id: String,
    /// Tasks in enqueue order.
    pub tasks: Vec<UploadTask>,
    /// Set only by the completion controller.
    pub is_completed: bool,
    /// Reference to the generated artifact, present once `is_completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DocumentBatch {
    pub fn new(batch_id: &str, patient_id: &str) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            patient_id: patient_id.to_string(),
            tasks: Vec::new(),
            is_completed: false,
            artifact_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Derived progress snapshot. `completed + failed + pending == total`
    /// always holds: every non-terminal task counts as pending.
    pub fn progress(&self) -> BatchProgress {
        let mut completed = 0;
        let mut failed = 0;
        let mut pending = 0;
        let mut progress_sum = 0.0f32;

        for task in &self.tasks {
            match task.status {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Failed => failed += 1,
                TaskStatus::Pending | TaskStatus::Uploading | TaskStatus::Paused => pending += 1,
            }
            progress_sum += task.progress;
        }

        let total = self.tasks.len();
        BatchProgress {
            total,
            completed,
            failed,
            pending,
            overall_progress: if total == 0 {
                0.0
            } else {
                progress_sum / total as f32
            },
        }
    }

    /// Tasks that finished successfully, in enqueue order.
    pub fn completed_tasks(&self) -> Vec<&UploadTask> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .collect()
    }

    /// Remote document ids of the completed tasks.
    pub fn completed_document_ids(&self) -> Vec<String> {
        self.completed_tasks()
            .iter()
            .filter_map(|t| t.document_id.clone())
            .collect()
    }
}

/// Per-batch task counts, computed on read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Not-yet-terminal tasks: pending, uploading, or paused.
    pub pending: usize,
    /// Mean of task progress, 0.0 for an empty batch.
    pub overall_progress: f32,
}

impl BatchProgress {
    /// The bucket partition invariant.
    pub fn is_partition(&self) -> bool {
        self.completed + self.failed + self.pending == self.total
    }
}
