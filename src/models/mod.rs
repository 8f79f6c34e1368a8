//! Domain model: tasks, batches, visit entries, and generated artifacts.

pub mod artifact;
pub mod batch;
pub mod task;
pub mod visit;

pub use artifact::{Artifact, TimelineEvent};
pub use batch::{BatchProgress, DocumentBatch};
pub use task::{TaskStatus, UploadTask};
pub use visit::{Priority, VisitEntry, VisitStatus};
