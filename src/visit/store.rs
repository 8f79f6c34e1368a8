//! Visit queue storage behind the status-authority seam.
//!
//! All status writes happen as compare-and-set transitions inside one
//! store call, under one lock. The single-consultation rule is enforced
//! here: a transition into `in_consultation` scans for an occupant while
//! the lock is held, so two racing starts can never both pass.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::error::StatusError;
use crate::ids::new_queue_id;
use crate::models::{Priority, VisitEntry, VisitStatus};

/// Result of a transition request. `changed` is false when the entry was
/// already at (or past) the requested status and nothing was written.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub entry: VisitEntry,
    pub changed: bool,
}

/// Authority over visit entries and their statuses. The in-memory
/// implementation below is the default; a remote clinic server can stand
/// behind the same trait.
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Register a visit. Rejected if the patient already has an active
    /// entry. Token numbers count active entries only.
    async fn add_visit(
        &self,
        patient_id: &str,
        patient_name: &str,
        priority: Priority,
    ) -> Result<VisitEntry, StatusError>;

    /// Request a status transition. Re-requesting a status the entry has
    /// already reached succeeds with `changed: false`.
    async fn transition(
        &self,
        queue_id: &str,
        target: VisitStatus,
    ) -> Result<TransitionOutcome, StatusError>;

    async fn entry(&self, queue_id: &str) -> Result<Option<VisitEntry>, StatusError>;

    /// The patient's non-terminal entry, if any.
    async fn active_entry_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Option<VisitEntry>, StatusError>;

    /// Active entries, urgent first, then by token number.
    async fn queue_snapshot(&self) -> Result<Vec<VisitEntry>, StatusError>;

    /// The entry currently in consultation, if any.
    async fn current_consultation(&self) -> Result<Option<VisitEntry>, StatusError>;

    /// Drop terminal entries. Returns how many were removed.
    async fn cleanup_terminal(&self) -> Result<usize, StatusError>;
}

/// In-process store. One mutex serializes every read-modify-write.
pub struct InMemoryVisitStore {
    entries: Mutex<HashMap<String, VisitEntry>>,
}

impl InMemoryVisitStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVisitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisitStore for InMemoryVisitStore {
    async fn add_visit(
        &self,
        patient_id: &str,
        patient_name: &str,
        priority: Priority,
    ) -> Result<VisitEntry, StatusError> {
        let mut entries = lock(&self.entries);

        if entries
            .values()
            .any(|e| e.patient_id == patient_id && !e.status.is_terminal())
        {
            return Err(StatusError::AlreadyQueued {
                patient_id: patient_id.to_string(),
            });
        }

        let active = entries.values().filter(|e| !e.status.is_terminal()).count() as u32;
        let entry = VisitEntry::new(
            &new_queue_id(),
            patient_id,
            patient_name,
            active + 1,
            priority,
        );
        entries.insert(entry.queue_id.clone(), entry.clone());
        Ok(entry)
    }

    async fn transition(
        &self,
        queue_id: &str,
        target: VisitStatus,
    ) -> Result<TransitionOutcome, StatusError> {
        let mut entries = lock(&self.entries);

        let current = entries
            .get(queue_id)
            .ok_or_else(|| StatusError::NotFound {
                queue_id: queue_id.to_string(),
            })?
            .status;

        // Already there, or already past it along the forward pipeline.
        // A completed entry is past every forward target, so a client
        // retry of an earlier transition lands here even after the visit
        // finished. Cancelled sits outside the pipeline and only matches
        // itself. Checked before the slot guard: a late retry must not
        // report a conflict it has no stake in.
        if current == target
            || (current != VisitStatus::Cancelled
                && target != VisitStatus::Cancelled
                && current.rank() >= target.rank())
        {
            return Ok(TransitionOutcome {
                entry: entries[queue_id].clone(),
                changed: false,
            });
        }

        // Consultation slot check before taking a mutable borrow.
        if target == VisitStatus::InConsultation {
            if let Some(occupant) = entries
                .values()
                .find(|e| e.status == VisitStatus::InConsultation && e.queue_id != queue_id)
            {
                return Err(StatusError::Conflict {
                    occupant_patient_id: occupant.patient_id.clone(),
                });
            }
        }

        let entry = entries
            .get_mut(queue_id)
            .ok_or_else(|| StatusError::NotFound {
                queue_id: queue_id.to_string(),
            })?;

        if !entry.status.can_step_to(target) {
            return Err(StatusError::InvalidTransition {
                from: entry.status,
                to: target,
            });
        }

        entry.status = target;
        let now = Utc::now();
        let slot = match target {
            VisitStatus::NurseCompleted => &mut entry.nurse_completed_at,
            VisitStatus::ReadyForDoctor => &mut entry.timeline_ready_at,
            VisitStatus::InConsultation => &mut entry.started_at,
            VisitStatus::Completed => &mut entry.completed_at,
            VisitStatus::Cancelled => &mut entry.cancelled_at,
            VisitStatus::Waiting => &mut entry.nurse_completed_at, // unreachable: no edge into waiting
        };
        if slot.is_none() {
            *slot = Some(now);
        }

        Ok(TransitionOutcome {
            entry: entry.clone(),
            changed: true,
        })
    }

    async fn entry(&self, queue_id: &str) -> Result<Option<VisitEntry>, StatusError> {
        Ok(lock(&self.entries).get(queue_id).cloned())
    }

    async fn active_entry_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Option<VisitEntry>, StatusError> {
        Ok(lock(&self.entries)
            .values()
            .filter(|e| e.patient_id == patient_id && !e.status.is_terminal())
            .max_by_key(|e| e.status.rank())
            .cloned())
    }

    async fn queue_snapshot(&self) -> Result<Vec<VisitEntry>, StatusError> {
        let mut active: Vec<VisitEntry> = lock(&self.entries)
            .values()
            .filter(|e| !e.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|e| (e.priority != Priority::Urgent, e.token_number));
        Ok(active)
    }

    async fn current_consultation(&self) -> Result<Option<VisitEntry>, StatusError> {
        Ok(lock(&self.entries)
            .values()
            .find(|e| e.status == VisitStatus::InConsultation)
            .cloned())
    }

    async fn cleanup_terminal(&self) -> Result<usize, StatusError> {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, e| !e.status.is_terminal());
        Ok(before - entries.len())
    }
}

/// Recover the map from a poisoned lock; entries stay consistent because
/// every write is a single assignment.
fn lock<'a>(
    entries: &'a Mutex<HashMap<String, VisitEntry>>,
) -> std::sync::MutexGuard<'a, HashMap<String, VisitEntry>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
