//! Wiring for the workflow services. One backend handle fans out to the
//! upload queue, the completion controller, the visit machine, and the
//! sync client; the two event buses are shared across them.

use std::sync::Arc;

use crate::backend::ClinicBackend;
use crate::config::{CompletionConfig, QueueConfig, SyncConfig};
use crate::events::{EventBus, SyncEvent, WorkflowEvent};
use crate::livesync::LiveSyncClient;
use crate::queue::{BatchCompletionController, BatchStore, UploadQueue};
use crate::visit::{InMemoryVisitStore, VisitStatusMachine, VisitStore};

/// Tuning for all services, in one place.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub queue: QueueConfig,
    pub completion: CompletionConfig,
    pub sync: SyncConfig,
}

/// The assembled workflow services.
#[derive(Clone)]
pub struct WorkflowCore {
    pub queue: UploadQueue,
    pub completion: BatchCompletionController,
    pub visits: VisitStatusMachine,
    pub sync: LiveSyncClient,
    pub workflow_events: EventBus<WorkflowEvent>,
    pub sync_events: EventBus<SyncEvent>,
}

impl WorkflowCore {
    /// Wire everything against the default in-process visit store.
    pub fn new(backend: Arc<dyn ClinicBackend>, config: CoreConfig) -> Self {
        Self::with_visit_store(backend, Arc::new(InMemoryVisitStore::new()), config)
    }

    /// Wire against an externally provided visit authority.
    pub fn with_visit_store(
        backend: Arc<dyn ClinicBackend>,
        visit_store: Arc<dyn VisitStore>,
        config: CoreConfig,
    ) -> Self {
        let workflow_events: EventBus<WorkflowEvent> = EventBus::new(config.queue.event_capacity);
        let sync_events: EventBus<SyncEvent> = EventBus::new(config.sync.event_capacity);

        let store = BatchStore::new();
        let visits = VisitStatusMachine::new(visit_store, workflow_events.clone());
        let queue = UploadQueue::new(
            backend.clone(),
            store.clone(),
            workflow_events.clone(),
            config.queue,
        );
        let completion = BatchCompletionController::new(
            backend.clone(),
            store,
            visits.clone(),
            workflow_events.clone(),
            config.completion,
        );
        let sync = LiveSyncClient::new(backend, sync_events.clone(), config.sync);

        Self {
            queue,
            completion,
            visits,
            sync,
            workflow_events,
            sync_events,
        }
    }

    /// Stop background activity: pause the drain loop and cancel polling.
    pub async fn shutdown(&self) {
        self.queue.pause().await;
        self.sync.shutdown().await;
        tracing::info!("Workflow core shut down");
    }
}
