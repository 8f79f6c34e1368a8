//! Upload task: one file's transfer unit within a batch.
//!
//! Invariants enforced by the state setters (never by callers):
//! - `progress == 1.0` exactly when `status == Completed`
//! - `error` is set exactly when `status == Failed`

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::new_task_id;

/// Lifecycle status of an upload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
    Paused,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "uploading" => Some(Self::Uploading),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    /// Terminal statuses never leave the task without an explicit retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One file upload unit. The queue holds a reference to the payload,
/// never the bytes themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTask {
    pub id: String,
    pub patient_id: String,
    pub batch_id: String,
    /// Handle to the local file to transfer.
    pub payload: PathBuf,
    pub filename: String,
    pub status: TaskStatus,
    /// Transfer progress in [0, 1].
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Remote document id, set once the transfer completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadTask {
    /// Create a new pending task.
    pub fn new(patient_id: &str, batch_id: &str, payload: PathBuf, filename: &str) -> Self {
        Self {
            id: new_task_id(),
            patient_id: patient_id.to_string(),
            batch_id: batch_id.to_string(),
            payload,
            filename: filename.to_string(),
            status: TaskStatus::Pending,
            progress: 0.0,
            error: None,
            document_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    // ── State setters (invariant-preserving) ─────────────────

    pub fn mark_uploading(&mut self) {
        self.status = TaskStatus::Uploading;
    }

    pub fn set_progress(&mut self, progress: f32) {
        // 1.0 is reserved for the completed transition
        self.progress = progress.clamp(0.0, 0.99);
    }

    pub fn mark_completed(&mut self, document_id: String) {
        self.status = TaskStatus::Completed;
        self.progress = 1.0;
        self.error = None;
        self.document_id = Some(document_id);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TaskStatus::Failed;
        if self.progress >= 1.0 {
            self.progress = 0.99;
        }
        self.error = Some(error);
    }

    pub fn mark_paused(&mut self) {
        self.status = TaskStatus::Paused;
    }

    pub fn mark_pending(&mut self) {
        self.status = TaskStatus::Pending;
    }

    /// Reset a failed task for another attempt.
    pub fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Pending;
        self.progress = 0.0;
        self.error = None;
        self.completed_at = None;
    }

    /// Check the task-level invariants. Used by tests and debug assertions.
    pub fn invariants_hold(&self) -> bool {
        let progress_ok = (self.progress >= 1.0) == (self.status == TaskStatus::Completed);
        let error_ok = self.error.is_some() == (self.status == TaskStatus::Failed);
        progress_ok && error_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task() -> UploadTask {
        UploadTask::new("PT_1", "BATCH_1", PathBuf::from("/tmp/scan-001.jpg"), "scan-001.jpg")
    }

    #[test]
    fn task_status_roundtrip() {
        let variants = [
            TaskStatus::Pending,
            TaskStatus::Uploading,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Paused,
        ];
        for s in &variants {
            let parsed = TaskStatus::from_str(s.as_str());
            assert_eq!(parsed, Some(*s), "Roundtrip failed for {s}");
        }
        assert_eq!(TaskStatus::from_str("unknown"), None);
    }

    #[test]
    fn task_status_serde_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Uploading).unwrap();
        assert_eq!(json, "\"uploading\"");
    }

    #[test]
    fn new_task_is_pending_with_zero_progress() {
        let task = make_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0.0);
        assert!(task.error.is_none());
        assert!(task.document_id.is_none());
        assert!(task.invariants_hold());
    }

    #[test]
    fn mark_completed_sets_progress_one_and_timestamp() {
        let mut task = make_task();
        task.mark_uploading();
        task.mark_completed("DOC_1".to_string());

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 1.0);
        assert_eq!(task.document_id.as_deref(), Some("DOC_1"));
        assert!(task.completed_at.is_some());
        assert!(task.invariants_hold());
    }

    #[test]
    fn mark_failed_sets_error_and_keeps_progress_below_one() {
        let mut task = make_task();
        task.mark_uploading();
        task.set_progress(0.7);
        task.mark_failed("connection reset".to_string());

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.progress < 1.0);
        assert_eq!(task.error.as_deref(), Some("connection reset"));
        assert!(task.invariants_hold());
    }

    #[test]
    fn set_progress_never_reaches_one() {
        let mut task = make_task();
        task.mark_uploading();
        task.set_progress(1.0);
        assert!(task.progress < 1.0);
        assert!(task.invariants_hold());
    }

    #[test]
    fn reset_for_retry_clears_failure_state() {
        let mut task = make_task();
        task.mark_failed("timeout".to_string());
        task.reset_for_retry();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0.0);
        assert!(task.error.is_none());
        assert!(task.invariants_hold());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Uploading.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
    }
}
