//! Role-facing operations over the visit pipeline.
//!
//! Thin façade over the status authority: each operation requests one
//! forward transition and broadcasts the change when one actually
//! happened. Idempotent re-requests stay silent.

use std::sync::Arc;

use super::error::StatusError;
use super::store::{TransitionOutcome, VisitStore};
use serde::{Deserialize, Serialize};

use crate::events::{EventBus, WorkflowEvent};
use crate::models::{Priority, VisitEntry, VisitStatus};

/// Active queue entries plus their per-stage counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub waiting: usize,
    pub nurse_completed: usize,
    pub ready_for_doctor: usize,
    pub in_consultation: usize,
    pub total_active: usize,
    /// Urgent first, then by token number.
    pub entries: Vec<VisitEntry>,
}

#[derive(Clone)]
pub struct VisitStatusMachine {
    store: Arc<dyn VisitStore>,
    events: EventBus<WorkflowEvent>,
}

impl VisitStatusMachine {
    pub fn new(store: Arc<dyn VisitStore>, events: EventBus<WorkflowEvent>) -> Self {
        Self { store, events }
    }

    /// Register a patient visit at the reception desk.
    pub async fn add_visit(
        &self,
        patient_id: &str,
        patient_name: &str,
        priority: Priority,
    ) -> Result<VisitEntry, StatusError> {
        let entry = self.store.add_visit(patient_id, patient_name, priority).await?;
        tracing::info!(
            queue_id = entry.queue_id,
            patient_id,
            token = entry.token_number,
            "Visit added to queue"
        );
        self.broadcast(&entry);
        Ok(entry)
    }

    /// Nurse station finished capturing documents for this visit.
    pub async fn mark_nurse_complete(&self, queue_id: &str) -> Result<VisitEntry, StatusError> {
        self.step(queue_id, VisitStatus::NurseCompleted).await
    }

    /// The visit's artifact is generated; the doctor may open it.
    pub async fn mark_ready_for_doctor(&self, queue_id: &str) -> Result<VisitEntry, StatusError> {
        self.step(queue_id, VisitStatus::ReadyForDoctor).await
    }

    /// Doctor opens the consultation. Fails with `Conflict` while another
    /// patient occupies the slot.
    pub async fn start_consultation(&self, queue_id: &str) -> Result<VisitEntry, StatusError> {
        self.step(queue_id, VisitStatus::InConsultation).await
    }

    /// Doctor closes the consultation.
    pub async fn complete_consultation(&self, queue_id: &str) -> Result<VisitEntry, StatusError> {
        self.step(queue_id, VisitStatus::Completed).await
    }

    /// Remove a visit that has not yet entered consultation.
    pub async fn cancel(&self, queue_id: &str) -> Result<VisitEntry, StatusError> {
        self.step(queue_id, VisitStatus::Cancelled).await
    }

    pub async fn entry(&self, queue_id: &str) -> Result<Option<VisitEntry>, StatusError> {
        self.store.entry(queue_id).await
    }

    pub async fn active_entry_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Option<VisitEntry>, StatusError> {
        self.store.active_entry_for_patient(patient_id).await
    }

    /// Waiting-room view: active entries with per-stage counts.
    pub async fn queue_snapshot(&self) -> Result<QueueSnapshot, StatusError> {
        let entries = self.store.queue_snapshot().await?;
        let count = |status: VisitStatus| entries.iter().filter(|e| e.status == status).count();
        Ok(QueueSnapshot {
            waiting: count(VisitStatus::Waiting),
            nurse_completed: count(VisitStatus::NurseCompleted),
            ready_for_doctor: count(VisitStatus::ReadyForDoctor),
            in_consultation: count(VisitStatus::InConsultation),
            total_active: entries.len(),
            entries,
        })
    }

    pub async fn current_consultation(&self) -> Result<Option<VisitEntry>, StatusError> {
        self.store.current_consultation().await
    }

    /// End-of-day sweep of completed and cancelled visits.
    pub async fn cleanup_terminal(&self) -> Result<usize, StatusError> {
        let removed = self.store.cleanup_terminal().await?;
        if removed > 0 {
            tracing::info!(removed, "Cleaned up terminal visits");
        }
        Ok(removed)
    }

    async fn step(&self, queue_id: &str, target: VisitStatus) -> Result<VisitEntry, StatusError> {
        let TransitionOutcome { entry, changed } = self.store.transition(queue_id, target).await?;
        if changed {
            tracing::info!(queue_id, patient_id = entry.patient_id, status = %entry.status, "Visit transitioned");
            self.broadcast(&entry);
        }
        Ok(entry)
    }

    fn broadcast(&self, entry: &VisitEntry) {
        self.events.send(WorkflowEvent::VisitStatusChanged {
            queue_id: entry.queue_id.clone(),
            patient_id: entry.patient_id.clone(),
            status: entry.status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visit::store::InMemoryVisitStore;

    fn make_machine() -> VisitStatusMachine {
        VisitStatusMachine::new(Arc::new(InMemoryVisitStore::new()), EventBus::new(32))
    }

    async fn add_ready(machine: &VisitStatusMachine, patient: &str) -> String {
        let entry = machine
            .add_visit(patient, &format!("Patient {patient}"), Priority::Normal)
            .await
            .unwrap();
        machine.mark_nurse_complete(&entry.queue_id).await.unwrap();
        machine
            .mark_ready_for_doctor(&entry.queue_id)
            .await
            .unwrap();
        entry.queue_id
    }

    #[tokio::test]
    async fn second_doctor_waits_for_the_slot() {
        let machine = make_machine();
        let a = add_ready(&machine, "PT_A").await;
        let b = add_ready(&machine, "PT_B").await;

        machine.start_consultation(&a).await.unwrap();

        // Re-opening the same consultation is an idempotent success
        let entry = machine.start_consultation(&a).await.unwrap();
        assert_eq!(entry.status, VisitStatus::InConsultation);

        // Starting a different one is not
        let err = machine.start_consultation(&b).await.unwrap_err();
        assert!(matches!(err, StatusError::Conflict { .. }));

        // B's entry is untouched by the failed start
        let entry = machine.entry(&b).await.unwrap().unwrap();
        assert_eq!(entry.status, VisitStatus::ReadyForDoctor);
        assert!(entry.started_at.is_none());

        machine.complete_consultation(&a).await.unwrap();
        let entry = machine.start_consultation(&b).await.unwrap();
        assert_eq!(entry.status, VisitStatus::InConsultation);
    }

    #[tokio::test]
    async fn events_fire_only_on_actual_change() {
        let machine = make_machine();
        let mut rx = machine.events.subscribe();

        let entry = machine
            .add_visit("PT_A", "Asha Rao", Priority::Normal)
            .await
            .unwrap();
        machine.mark_nurse_complete(&entry.queue_id).await.unwrap();
        // Idempotent repeat: no new event
        machine.mark_nurse_complete(&entry.queue_id).await.unwrap();

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkflowEvent::VisitStatusChanged { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![VisitStatus::Waiting, VisitStatus::NurseCompleted]
        );
    }

    #[tokio::test]
    async fn delayed_retries_succeed_after_the_visit_completes() {
        let machine = make_machine();
        let a = add_ready(&machine, "PT_A").await;
        machine.start_consultation(&a).await.unwrap();
        machine.complete_consultation(&a).await.unwrap();
        let mut rx = machine.events.subscribe();

        // Late duplicate requests from either role land quietly
        let entry = machine.mark_nurse_complete(&a).await.unwrap();
        assert_eq!(entry.status, VisitStatus::Completed);
        let entry = machine.start_consultation(&a).await.unwrap();
        assert_eq!(entry.status, VisitStatus::Completed);

        // and emit nothing
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_after_consultation_started_is_rejected() {
        let machine = make_machine();
        let a = add_ready(&machine, "PT_A").await;
        machine.start_consultation(&a).await.unwrap();

        let err = machine.cancel(&a).await.unwrap_err();
        assert!(matches!(err, StatusError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn snapshot_counts_active_stages() {
        let machine = make_machine();
        machine
            .add_visit("PT_A", "Patient A", Priority::Normal)
            .await
            .unwrap();
        let b = machine
            .add_visit("PT_B", "Patient B", Priority::Normal)
            .await
            .unwrap();
        let c = add_ready(&machine, "PT_C").await;
        machine.mark_nurse_complete(&b.queue_id).await.unwrap();
        machine.start_consultation(&c).await.unwrap();

        let snapshot = machine.queue_snapshot().await.unwrap();
        assert_eq!(snapshot.waiting, 1);
        assert_eq!(snapshot.nurse_completed, 1);
        assert_eq!(snapshot.ready_for_doctor, 0);
        assert_eq!(snapshot.in_consultation, 1);
        assert_eq!(snapshot.total_active, 3);
        assert_eq!(snapshot.entries.len(), 3);
    }

    #[tokio::test]
    async fn unknown_queue_id_reports_not_found() {
        let machine = make_machine();
        let err = machine.mark_nurse_complete("Q_MISSING").await.unwrap_err();
        assert!(matches!(err, StatusError::NotFound { .. }));
    }
}
