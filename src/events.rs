//! Typed workflow events for UI bindings and tests.
//!
//! Consumers subscribe to a broadcast channel instead of watching a mutable
//! object graph; sends with no active receivers are fine and dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{Artifact, TaskStatus, VisitStatus};

/// State-change notifications emitted by the queue, the completion
/// controller, and the visit status machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    TaskStatusChanged {
        task_id: String,
        batch_id: String,
        status: TaskStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    TaskProgress {
        task_id: String,
        batch_id: String,
        progress: f32,
    },
    BatchCompleted {
        batch_id: String,
        patient_id: String,
        artifact_ref: String,
        completed: usize,
        failed: usize,
        pending: usize,
    },
    VisitStatusChanged {
        queue_id: String,
        patient_id: String,
        status: VisitStatus,
    },
}

/// Events emitted by the live sync client on the reviewing side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The selected patient's artifact content changed.
    NoteUpdated {
        patient_id: String,
        artifact: Artifact,
    },
    ConnectionChanged {
        state: ConnectionState,
    },
}

/// Tri-state connection indicator for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Connecting,
    Error,
}

/// Broadcasts events to all subscribers. Cloneable handle around one
/// shared channel.
#[derive(Clone)]
pub struct EventBus<E: Clone> {
    sender: Arc<broadcast::Sender<E>>,
}

impl<E: Clone> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Send an event to all subscribers. No active receivers is fine.
    pub fn send(&self, event: E) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}
