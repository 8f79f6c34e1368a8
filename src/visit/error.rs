//! Visit pipeline errors.

use thiserror::Error;

use crate::models::VisitStatus;

#[derive(Debug, Error)]
pub enum StatusError {
    /// Another patient already occupies the consultation slot.
    #[error("Consultation slot occupied by patient {occupant_patient_id}")]
    Conflict { occupant_patient_id: String },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: VisitStatus, to: VisitStatus },

    #[error("Visit not found: {queue_id}")]
    NotFound { queue_id: String },

    /// The patient already has an active (non-terminal) entry.
    #[error("Patient {patient_id} is already in the queue")]
    AlreadyQueued { patient_id: String },
}
