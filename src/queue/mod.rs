//! Document capture pipeline: the non-blocking upload queue, its batch
//! store, and the finalization controller.

pub mod completion;
pub mod error;
pub mod store;
pub mod upload;

pub use completion::{BatchCompletionController, CompletionPolicy, CompletionReport};
pub use error::{CompletionError, UploadError};
pub use store::BatchStore;
pub use upload::UploadQueue;
