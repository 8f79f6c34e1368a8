//! Cliniq core: clinical workflow coordination for a document-driven
//! clinic: non-blocking document capture, batch finalization into
//! generated artifacts, the visit status pipeline with its single
//! consultation slot, and live sync for the reviewing doctor.

pub mod backend;
pub mod config;
pub mod core;
pub mod events;
pub mod ids;
pub mod livesync;
pub mod models;
pub mod queue;
pub mod visit;

pub use backend::{BackendError, ClinicBackend, UploadReceipt};
pub use crate::core::{CoreConfig, WorkflowCore};
pub use events::{ConnectionState, EventBus, SyncEvent, WorkflowEvent};
pub use livesync::LiveSyncClient;
pub use queue::{
    BatchCompletionController, CompletionError, CompletionPolicy, CompletionReport, UploadError,
    UploadQueue,
};
pub use visit::{QueueSnapshot, StatusError, VisitStatusMachine};
