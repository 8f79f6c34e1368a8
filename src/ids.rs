//! Id generation for tasks, batches, queue entries, and artifacts.

use uuid::Uuid;

pub fn new_task_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_batch_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_queue_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_artifact_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_task_id(), new_task_id());
        assert_ne!(new_batch_id(), new_batch_id());
        assert_ne!(new_queue_id(), new_queue_id());
    }

    #[test]
    fn ids_parse_as_uuids() {
        assert!(Uuid::parse_str(&new_artifact_id()).is_ok());
    }
}
