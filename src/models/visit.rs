//! Visit entry: a patient visit's position in the clinical review pipeline.
//!
//! The pipeline is directed with no back-edges except into `cancelled`:
//!
//! ```text
//! waiting → nurse_completed → ready_for_doctor → in_consultation → completed
//! {waiting, nurse_completed, ready_for_doctor} → cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline status of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Waiting,
    NurseCompleted,
    ReadyForDoctor,
    InConsultation,
    Completed,
    Cancelled,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::NurseCompleted => "nurse_completed",
            Self::ReadyForDoctor => "ready_for_doctor",
            Self::InConsultation => "in_consultation",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "nurse_completed" => Some(Self::NurseCompleted),
            "ready_for_doctor" => Some(Self::ReadyForDoctor),
            "in_consultation" => Some(Self::InConsultation),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Position along the forward pipeline. `Cancelled` sits outside it.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::NurseCompleted => 1,
            Self::ReadyForDoctor => 2,
            Self::InConsultation => 3,
            Self::Completed => 4,
            Self::Cancelled => 5,
        }
    }

    /// Terminal entries are retired from the active queue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `target` is one forward step from `self`.
    /// Cancellation is allowed from any pre-consultation state.
    pub fn can_step_to(&self, target: VisitStatus) -> bool {
        match (self, target) {
            (Self::Waiting, Self::NurseCompleted)
            | (Self::NurseCompleted, Self::ReadyForDoctor)
            | (Self::ReadyForDoctor, Self::InConsultation)
            | (Self::InConsultation, Self::Completed) => true,
            (Self::Waiting | Self::NurseCompleted | Self::ReadyForDoctor, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Queue priority of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// A patient visit's queue entry. Timestamps are each set exactly once,
/// by the store, when the corresponding transition fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitEntry {
    pub queue_id: String,
    pub patient_id: String,
    pub patient_name: String,
    /// Ordering hint within the active queue.
    pub token_number: u32,
    pub priority: Priority,
    pub status: VisitStatus,
    pub added_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nurse_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline_ready_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl VisitEntry {
    pub fn new(
        queue_id: &str,
        patient_id: &str,
        patient_name: &str,
        token_number: u32,
        priority: Priority,
    ) -> Self {
        Self {
            queue_id: queue_id.to_string(),
            patient_id: patient_id.to_string(),
            patient_name: patient_name.to_string(),
            token_number,
            priority,
            status: VisitStatus::Waiting,
            added_at: Utc::now(),
            nurse_completed_at: None,
            timeline_ready_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }
}
