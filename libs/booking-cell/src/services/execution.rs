use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use shared_database::ClinicStore;
use shared_models::{
    EntityKind, ExecutionDetail, ExecutionRecord, ExecutionState, ScheduleError,
};

/// Provider-side access to execution records: confirming them and filling in
/// the type-specific clinical payloads. Completion and cancellation ride on
/// the owning booking's transitions.
pub struct ExecutionRecordService {
    store: Arc<ClinicStore>,
}

impl ExecutionRecordService {
    pub fn new(store: Arc<ClinicStore>) -> Self {
        Self { store }
    }

    pub async fn get_for_booking(&self, booking_id: Uuid) -> Result<ExecutionRecord, ScheduleError> {
        self.store
            .read(move |tables| {
                tables
                    .execution_for_booking(booking_id)
                    .cloned()
                    .ok_or(ScheduleError::NotFound {
                        entity: EntityKind::ExecutionRecord,
                        id: booking_id,
                    })
            })
            .await
    }

    /// Pending → Confirmed, once the provider acknowledges the booking.
    pub async fn confirm(&self, record_id: Uuid) -> Result<ExecutionRecord, ScheduleError> {
        let now = Utc::now();
        self.store
            .transaction(move |tables| {
                let record = tables.execution_record_mut(record_id)?;
                if record.state != ExecutionState::Pending {
                    return Err(ScheduleError::InvalidTransition {
                        entity: EntityKind::ExecutionRecord,
                        from: record.state.to_string(),
                        to: ExecutionState::Confirmed.to_string(),
                    });
                }
                record.state = ExecutionState::Confirmed;
                record.updated_at = now;
                Ok(record.clone())
            })
            .await
    }

    /// Record consultation notes on an appointment record.
    pub async fn record_appointment(
        &self,
        record_id: Uuid,
        diagnosis: Option<String>,
        follow_up: Option<String>,
    ) -> Result<ExecutionRecord, ScheduleError> {
        self.update_detail(record_id, move |detail| match detail {
            ExecutionDetail::Appointment {
                diagnosis: slot_diagnosis,
                follow_up_notes,
            } => {
                if diagnosis.is_some() {
                    *slot_diagnosis = diagnosis;
                }
                if follow_up.is_some() {
                    *follow_up_notes = follow_up;
                }
                Ok(())
            }
            _ => Err(ScheduleError::Validation(
                "record is not an appointment".to_string(),
            )),
        })
        .await
    }

    /// Record results on an exam record.
    pub async fn record_exam(
        &self,
        record_id: Uuid,
        results: Option<String>,
        performed_by: Option<Uuid>,
    ) -> Result<ExecutionRecord, ScheduleError> {
        self.update_detail(record_id, move |detail| match detail {
            ExecutionDetail::Exam {
                results: slot_results,
                performed_by: slot_performed_by,
            } => {
                if results.is_some() {
                    *slot_results = results;
                }
                if performed_by.is_some() {
                    *slot_performed_by = performed_by;
                }
                Ok(())
            }
            _ => Err(ScheduleError::Validation("record is not an exam".to_string())),
        })
        .await
    }

    /// Record surgical notes and outcome on an operation record.
    pub async fn record_operation(
        &self,
        record_id: Uuid,
        surgical_notes: Option<String>,
        outcome: Option<String>,
    ) -> Result<ExecutionRecord, ScheduleError> {
        self.update_detail(record_id, move |detail| match detail {
            ExecutionDetail::Operation {
                surgical_notes: slot_notes,
                outcome: slot_outcome,
            } => {
                if surgical_notes.is_some() {
                    *slot_notes = surgical_notes;
                }
                if outcome.is_some() {
                    *slot_outcome = outcome;
                }
                Ok(())
            }
            _ => Err(ScheduleError::Validation(
                "record is not an operation".to_string(),
            )),
        })
        .await
    }

    async fn update_detail<F>(
        &self,
        record_id: Uuid,
        apply: F,
    ) -> Result<ExecutionRecord, ScheduleError>
    where
        F: FnOnce(&mut ExecutionDetail) -> Result<(), ScheduleError> + Send,
    {
        let now = Utc::now();
        let record = self
            .store
            .transaction(move |tables| {
                let record = tables.execution_record_mut(record_id)?;
                if record.state == ExecutionState::Cancelled {
                    return Err(ScheduleError::Validation(format!(
                        "execution record {} is cancelled and can no longer change",
                        record_id
                    )));
                }
                apply(&mut record.detail)?;
                record.updated_at = now;
                Ok(record.clone())
            })
            .await?;
        debug!("execution record {} updated", record_id);
        Ok(record)
    }
}
