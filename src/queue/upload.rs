//! Upload queue: accepts documents without blocking the capturing device
//! and drains them in the background.
//!
//! One drain loop at a time: starting it goes through an atomic
//! compare-exchange, so concurrent enqueues collapse into a single active
//! loop. The loop claims the oldest pending task (exclusive, under the
//! store lock), transfers it with incremental progress, and records the
//! terminal status. Pausing halts the loop after in-flight transfers
//! finish; resuming restarts it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::error::UploadError;
use super::store::BatchStore;
use crate::backend::ClinicBackend;
use crate::config::QueueConfig;
use crate::events::{EventBus, WorkflowEvent};
use crate::models::{TaskStatus, UploadTask};

/// Background document upload service. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct UploadQueue {
    backend: Arc<dyn ClinicBackend>,
    store: BatchStore,
    events: EventBus<WorkflowEvent>,
    config: Arc<QueueConfig>,
    draining: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl UploadQueue {
    pub fn new(
        backend: Arc<dyn ClinicBackend>,
        store: BatchStore,
        events: EventBus<WorkflowEvent>,
        config: QueueConfig,
    ) -> Self {
        Self {
            backend,
            store,
            events,
            config: Arc::new(config),
            draining: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a batch via the external registration call. On failure no
    /// local batch exists and the caller must retry.
    pub async fn start_batch(&self, patient_id: &str) -> Result<String, UploadError> {
        let batch_id = self
            .backend
            .register_batch(patient_id)
            .await
            .map_err(UploadError::BatchCreation)?;
        self.store.insert_batch(&batch_id, patient_id).await;
        tracing::info!(batch_id, patient_id, "Batch registered");
        Ok(batch_id)
    }

    /// Append a pending task and return its id immediately. Kicks the
    /// drain loop if it is idle and the queue is not paused.
    pub async fn enqueue(
        &self,
        patient_id: &str,
        batch_id: &str,
        payload: PathBuf,
        filename: &str,
    ) -> Result<String, UploadError> {
        let task = self
            .store
            .enqueue_task(patient_id, batch_id, payload, filename)
            .await?;
        self.emit_status(&task.batch_id, &task.id, TaskStatus::Pending, None);
        tracing::debug!(task_id = task.id, batch_id, filename, "Task enqueued");
        self.ensure_draining();
        Ok(task.id)
    }

    /// Flip all pending tasks to paused and halt draining after the
    /// current in-flight transfers finish.
    pub async fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        let flipped = self.store.pause_pending().await;
        for (batch_id, task_id) in &flipped {
            self.emit_status(batch_id, task_id, TaskStatus::Paused, None);
        }
        tracing::info!(paused_tasks = flipped.len(), "Upload queue paused");
    }

    /// Flip paused tasks back to pending and restart draining.
    pub async fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        let flipped = self.store.resume_paused().await;
        for (batch_id, task_id) in &flipped {
            self.emit_status(batch_id, task_id, TaskStatus::Pending, None);
        }
        tracing::info!(resumed_tasks = flipped.len(), "Upload queue resumed");
        self.ensure_draining();
    }

    /// Reset a failed task and drain again. Only valid on failed tasks.
    pub async fn retry(&self, task_id: &str) -> Result<(), UploadError> {
        let task = self.store.retry_task(task_id).await?;
        self.emit_status(&task.batch_id, &task.id, TaskStatus::Pending, None);
        tracing::info!(task_id, "Task reset for retry");
        self.ensure_draining();
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn store(&self) -> &BatchStore {
        &self.store
    }

    // ── Drain loop ───────────────────────────────────────────

    /// Start the drain loop unless one is already running or the queue is
    /// paused. Concurrent callers collapse into a single loop.
    fn ensure_draining(&self) {
        if self.paused.load(Ordering::Acquire) {
            return;
        }
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            queue.drain_loop().await;
        });
    }

    async fn drain_loop(&self) {
        tracing::debug!("Drain loop started");
        let mut in_flight: JoinSet<()> = JoinSet::new();
        loop {
            while in_flight.len() < self.config.concurrency && !self.is_paused() {
                match self.store.claim_next_pending().await {
                    Some(task) => {
                        self.emit_status(&task.batch_id, &task.id, TaskStatus::Uploading, None);
                        let queue = self.clone();
                        in_flight.spawn(async move {
                            queue.transfer(task).await;
                        });
                    }
                    None => break,
                }
            }
            if in_flight.is_empty() {
                break;
            }
            in_flight.join_next().await;
        }
        self.draining.store(false, Ordering::Release);
        tracing::debug!("Drain loop stopped");

        // An enqueue may have landed while the loop was exiting.
        if !self.is_paused() && self.store.has_pending().await {
            self.ensure_draining();
        }
    }

    /// Perform one transfer, forwarding incremental progress into the
    /// store and onto the event bus.
    async fn transfer(&self, task: UploadTask) {
        let (tx, mut rx) = mpsc::unbounded_channel::<f32>();

        let forwarder = {
            let store = self.store.clone();
            let events = self.events.clone();
            let batch_id = task.batch_id.clone();
            let task_id = task.id.clone();
            tokio::spawn(async move {
                while let Some(progress) = rx.recv().await {
                    store.set_task_progress(&batch_id, &task_id, progress).await;
                    events.send(WorkflowEvent::TaskProgress {
                        task_id: task_id.clone(),
                        batch_id: batch_id.clone(),
                        progress,
                    });
                }
            })
        };

        let progress = move |p: f32| {
            let _ = tx.send(p);
        };

        let result = self
            .backend
            .upload_document(
                &task.patient_id,
                &task.batch_id,
                &task.payload,
                &task.filename,
                &progress,
            )
            .await;

        // Close the progress channel before recording the terminal status
        // so no late progress write trails the completion.
        drop(progress);
        let _ = forwarder.await;

        match result {
            Ok(receipt) => {
                self.store
                    .complete_task(&task.batch_id, &task.id, receipt.document_id.clone())
                    .await;
                self.emit_status(&task.batch_id, &task.id, TaskStatus::Completed, None);
                tracing::info!(
                    task_id = task.id,
                    document_id = receipt.document_id,
                    "Upload completed"
                );
            }
            Err(e) => {
                let message = e.to_string();
                self.store
                    .fail_task(&task.batch_id, &task.id, message.clone())
                    .await;
                self.emit_status(&task.batch_id, &task.id, TaskStatus::Failed, Some(message));
                tracing::warn!(task_id = task.id, error = %e, "Upload failed");
            }
        }
    }

    fn emit_status(&self, batch_id: &str, task_id: &str, status: TaskStatus, error: Option<String>) {
        self.events.send(WorkflowEvent::TaskStatusChanged {
            task_id: task_id.to_string(),
            batch_id: batch_id.to_string(),
            status,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::backend::{BackendError, ProgressFn, UploadReceipt};
    use crate::ids::new_batch_id;
    use crate::models::Artifact;

    /// In-memory backend: records upload order, fails configured filenames.
    struct MockBackend {
        uploads: Mutex<Vec<String>>,
        fail_filenames: Mutex<HashSet<String>>,
        fail_register: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                fail_filenames: Mutex::new(HashSet::new()),
                fail_register: false,
            }
        }

        fn failing_register() -> Self {
            Self {
                fail_register: true,
                ..Self::new()
            }
        }

        fn fail_on(self, filename: &str) -> Self {
            self.fail_filenames
                .lock()
                .unwrap()
                .insert(filename.to_string());
            self
        }

        fn clear_failures(&self) {
            self.fail_filenames.lock().unwrap().clear();
        }

        fn upload_log(&self) -> Vec<String> {
            self.uploads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClinicBackend for MockBackend {
        async fn register_batch(&self, _patient_id: &str) -> Result<String, BackendError> {
            if self.fail_register {
                return Err(BackendError::Transport("registration unreachable".into()));
            }
            Ok(new_batch_id())
        }

        async fn upload_document(
            &self,
            _patient_id: &str,
            _batch_id: &str,
            _payload: &Path,
            filename: &str,
            progress: &ProgressFn,
        ) -> Result<UploadReceipt, BackendError> {
            progress(0.5);
            if self.fail_filenames.lock().unwrap().contains(filename) {
                return Err(BackendError::Transport("connection reset".into()));
            }
            self.uploads.lock().unwrap().push(filename.to_string());
            Ok(UploadReceipt {
                document_id: format!("DOC_{filename}"),
                extracted_data: None,
            })
        }

        async fn generate_artifact(
            &self,
            _patient_id: &str,
            _batch_id: &str,
            _document_ids: &[String],
        ) -> Result<Artifact, BackendError> {
            unreachable!("not exercised by the upload queue")
        }

        async fn get_artifact(&self, _patient_id: &str) -> Result<Option<Artifact>, BackendError> {
            Ok(None)
        }
    }

    fn make_queue(backend: MockBackend) -> (UploadQueue, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let queue = UploadQueue::new(
            backend.clone(),
            BatchStore::new(),
            EventBus::new(64),
            QueueConfig::default(),
        );
        (queue, backend)
    }

    /// Poll the batch until `done` tasks are terminal, or panic.
    async fn wait_for_terminal(queue: &UploadQueue, batch_id: &str, done: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(p) = queue.store().progress(batch_id).await {
                    if p.completed + p.failed >= done {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("tasks did not reach a terminal status in time");
    }

    #[tokio::test]
    async fn start_batch_failure_leaves_no_local_state() {
        let (queue, _) = make_queue(MockBackend::failing_register());
        let result = queue.start_batch("PT_1").await;
        assert!(matches!(result, Err(UploadError::BatchCreation(_))));
    }

    #[tokio::test]
    async fn enqueue_drains_in_fifo_order() {
        let (queue, backend) = make_queue(MockBackend::new());
        let batch_id = queue.start_batch("PT_1").await.unwrap();

        for name in ["first.jpg", "second.jpg", "third.jpg"] {
            queue
                .enqueue("PT_1", &batch_id, PathBuf::from(format!("/tmp/{name}")), name)
                .await
                .unwrap();
        }
        wait_for_terminal(&queue, &batch_id, 3).await;

        assert_eq!(backend.upload_log(), vec!["first.jpg", "second.jpg", "third.jpg"]);
        let p = queue.store().progress(&batch_id).await.unwrap();
        assert_eq!(p.completed, 3);
        assert!((p.overall_progress - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn failed_transfer_records_error_and_is_retryable() {
        let (queue, backend) = make_queue(MockBackend::new().fail_on("bad.jpg"));
        let batch_id = queue.start_batch("PT_1").await.unwrap();
        let task_id = queue
            .enqueue("PT_1", &batch_id, PathBuf::from("/tmp/bad.jpg"), "bad.jpg")
            .await
            .unwrap();
        wait_for_terminal(&queue, &batch_id, 1).await;

        let task = queue.store().task(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_deref().unwrap().contains("connection reset"));
        assert!(task.invariants_hold());

        // The failure is local: retry after the transport recovers
        backend.clear_failures();
        queue.retry(&task_id).await.unwrap();
        wait_for_terminal(&queue, &batch_id, 1).await;

        let task = queue.store().task(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 1.0);
    }

    #[tokio::test]
    async fn pause_then_resume_uploads_each_task_exactly_once() {
        let (queue, backend) = make_queue(MockBackend::new());
        let batch_id = queue.start_batch("PT_1").await.unwrap();

        // Pause first so the enqueued tasks sit pending
        queue.pause().await;
        queue
            .enqueue("PT_1", &batch_id, PathBuf::from("/tmp/a.jpg"), "a.jpg")
            .await
            .unwrap();
        queue
            .enqueue("PT_1", &batch_id, PathBuf::from("/tmp/b.jpg"), "b.jpg")
            .await
            .unwrap();

        // pause() flips the pending tasks to paused
        queue.pause().await;
        let batch = queue.store().batch(&batch_id).await.unwrap();
        assert!(batch.tasks.iter().all(|t| t.status == TaskStatus::Paused));

        queue.resume().await;
        wait_for_terminal(&queue, &batch_id, 2).await;

        let log = backend.upload_log();
        assert_eq!(log.len(), 2, "no duplicate uploads after resume: {log:?}");
        let p = queue.store().progress(&batch_id).await.unwrap();
        assert_eq!(p.completed, 2);
    }

    #[tokio::test]
    async fn enqueue_while_paused_does_not_drain() {
        let (queue, backend) = make_queue(MockBackend::new());
        let batch_id = queue.start_batch("PT_1").await.unwrap();

        queue.pause().await;
        queue
            .enqueue("PT_1", &batch_id, PathBuf::from("/tmp/a.jpg"), "a.jpg")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(backend.upload_log().is_empty());
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn progress_events_are_emitted() {
        let (queue, _) = make_queue(MockBackend::new());
        let mut rx = queue.events.subscribe();
        let batch_id = queue.start_batch("PT_1").await.unwrap();
        queue
            .enqueue("PT_1", &batch_id, PathBuf::from("/tmp/a.jpg"), "a.jpg")
            .await
            .unwrap();
        wait_for_terminal(&queue, &batch_id, 1).await;

        let mut saw_progress = false;
        let mut saw_completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                WorkflowEvent::TaskProgress { progress, .. } => {
                    assert!((0.0..1.0).contains(&progress));
                    saw_progress = true;
                }
                WorkflowEvent::TaskStatusChanged {
                    status: TaskStatus::Completed,
                    ..
                } => saw_completed = true,
                _ => {}
            }
        }
        assert!(saw_progress, "expected at least one TaskProgress event");
        assert!(saw_completed, "expected a completed TaskStatusChanged event");
    }

    #[tokio::test]
    async fn concurrent_enqueues_collapse_into_one_loop() {
        let (queue, backend) = make_queue(MockBackend::new());
        let batch_id = queue.start_batch("PT_1").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let queue = queue.clone();
            let batch_id = batch_id.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(
                        "PT_1",
                        &batch_id,
                        PathBuf::from(format!("/tmp/{i}.jpg")),
                        &format!("{i}.jpg"),
                    )
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        wait_for_terminal(&queue, &batch_id, 8).await;

        // Every task uploaded exactly once, no matter how many enqueues
        // raced on the loop start.
        let log = backend.upload_log();
        assert_eq!(log.len(), 8);
        let unique: HashSet<_> = log.iter().collect();
        assert_eq!(unique.len(), 8);
    }
}
