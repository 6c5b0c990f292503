use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use booking_cell::services::booking::create_in_tx;
use notification_cell::{emit, NotificationCategory, NotificationEvent, NotificationSink};
use shared_config::SchedulerConfig;
use shared_database::{ClinicStore, Tables};
use shared_models::{
    Booking, BookingChannel, ExecutionDetail, ProcedureAuthorization, ProcedureKind,
    ScheduleError,
};

use crate::models::{IssueAuthorizationRequest, PendingAuthorizations};

/// Issues, assigns and consumes procedure authorizations. An authorization is
/// single-use and time-bounded; consumption always rides in the transaction
/// that creates the booking it pays for.
pub struct ProcedureAuthorizationService {
    store: Arc<ClinicStore>,
    sink: Arc<dyn NotificationSink>,
    validity: chrono::Duration,
}

impl ProcedureAuthorizationService {
    pub fn new(
        store: Arc<ClinicStore>,
        sink: Arc<dyn NotificationSink>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            sink,
            validity: config.authorization_validity(),
        }
    }

    /// Issue an authorization out of a completed or ongoing consultation.
    ///
    /// Exams must stay within the issuing doctor's specialty. Operations
    /// without an explicit assignee auto-assign the issuer only when their
    /// specialty matches; otherwise the case must be derived to a specialist.
    pub async fn issue(
        &self,
        request: IssueAuthorizationRequest,
    ) -> Result<ProcedureAuthorization, ScheduleError> {
        debug!(
            "issuing {} authorization from appointment {}",
            request.procedure_kind, request.appointment_id
        );

        let now = Utc::now();
        let validity = self.validity;
        let authorization = self
            .store
            .transaction(move |tables| {
                let record = tables.execution_record(request.appointment_id)?.clone();
                if !matches!(record.detail, ExecutionDetail::Appointment { .. }) {
                    return Err(ScheduleError::Validation(format!(
                        "authorizations derive from consultations; record {} is not one",
                        request.appointment_id
                    )));
                }
                let booking = tables.booking(record.booking_id)?.clone();
                let issuer = tables.doctor(request.doctor_id)?.clone();
                let service = tables.service(request.service_id)?.clone();
                if !request.procedure_kind.matches_category(service.category) {
                    return Err(ScheduleError::Validation(format!(
                        "service {} is a {} service, not bookable as {}",
                        service.id, service.category, request.procedure_kind
                    )));
                }

                let required_specialty = request
                    .required_specialty
                    .clone()
                    .or_else(|| service.required_specialty.clone());

                let assigned_doctor_id = match request.procedure_kind {
                    ProcedureKind::Exam => {
                        if let Some(required) = &required_specialty {
                            if issuer.specialty != *required {
                                return Err(ScheduleError::SpecialtyMismatch {
                                    required: required.clone(),
                                    actual: issuer.specialty.clone(),
                                });
                            }
                        }
                        match request.assigned_doctor_id {
                            Some(candidate_id) => {
                                check_candidate(tables, candidate_id, &required_specialty)?;
                                Some(candidate_id)
                            }
                            None => Some(issuer.id),
                        }
                    }
                    ProcedureKind::Operation => match request.assigned_doctor_id {
                        Some(candidate_id) => {
                            check_candidate(tables, candidate_id, &required_specialty)?;
                            Some(candidate_id)
                        }
                        None => match &required_specialty {
                            Some(required) if issuer.specialty == *required => Some(issuer.id),
                            Some(required) => {
                                return Err(ScheduleError::MustDeriveToSpecialist {
                                    required: required.clone(),
                                })
                            }
                            None => Some(issuer.id),
                        },
                    },
                };

                let authorization = ProcedureAuthorization {
                    id: Uuid::new_v4(),
                    source_appointment_id: request.appointment_id,
                    patient_id: booking.patient_id,
                    authorizing_doctor_id: issuer.id,
                    procedure_kind: request.procedure_kind,
                    service_id: request.service_id,
                    required_specialty,
                    assigned_doctor_id,
                    issued_at: now,
                    expires_at: now + validity,
                    used_at: None,
                    generated_booking_id: None,
                };
                tables
                    .authorizations
                    .insert(authorization.id, authorization.clone());
                Ok(authorization)
            })
            .await?;

        info!(
            "{} authorization {} issued for patient {} (expires {})",
            authorization.procedure_kind,
            authorization.id,
            authorization.patient_id,
            authorization.expires_at
        );
        emit(
            self.sink.as_ref(),
            NotificationEvent::for_patient(
                authorization.patient_id,
                NotificationCategory::AuthorizationIssued,
                "Procedimiento autorizado",
                format!(
                    "Tiene un {} autorizado, vigente hasta {}.",
                    authorization.procedure_kind, authorization.expires_at
                ),
            )
            .about_authorization(authorization.id),
        )
        .await;
        if let Some(doctor_id) = authorization.assigned_doctor_id {
            emit(
                self.sink.as_ref(),
                NotificationEvent::for_doctor(
                    doctor_id,
                    NotificationCategory::AuthorizationAssigned,
                    "Procedimiento asignado",
                    format!("Se le asignó un {} autorizado.", authorization.procedure_kind),
                )
                .about_authorization(authorization.id),
            )
            .await;
        }

        Ok(authorization)
    }

    /// Assign (or reassign) the performing doctor, subject to the specialty
    /// guard.
    pub async fn assign(
        &self,
        authorization_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<ProcedureAuthorization, ScheduleError> {
        let now = Utc::now();
        let authorization = self
            .store
            .transaction(move |tables| {
                let authorization = tables.authorization(authorization_id)?.clone();
                if authorization.is_consumed() {
                    return Err(ScheduleError::AlreadyUsed { authorization_id });
                }
                if authorization.is_expired(now) {
                    return Err(ScheduleError::Expired {
                        authorization_id,
                        expired_at: authorization.expires_at,
                    });
                }
                check_candidate(tables, doctor_id, &authorization.required_specialty)?;

                let entry = tables.authorization_mut(authorization_id)?;
                entry.assigned_doctor_id = Some(doctor_id);
                Ok(entry.clone())
            })
            .await?;

        info!(
            "authorization {} assigned to doctor {}",
            authorization_id, doctor_id
        );
        emit(
            self.sink.as_ref(),
            NotificationEvent::for_doctor(
                doctor_id,
                NotificationCategory::AuthorizationAssigned,
                "Procedimiento asignado",
                format!("Se le asignó un {} autorizado.", authorization.procedure_kind),
            )
            .about_authorization(authorization.id),
        )
        .await;

        Ok(authorization)
    }

    /// Mark an authorization consumed by an existing booking. Exposed for
    /// callers composing their own transaction-equivalent flows; `redeem` is
    /// the usual entry point.
    pub async fn consume(
        &self,
        authorization_id: Uuid,
        generated_booking_id: Uuid,
    ) -> Result<ProcedureAuthorization, ScheduleError> {
        let now = Utc::now();
        self.store
            .transaction(move |tables| {
                tables.booking(generated_booking_id)?;
                consume_in_tx(tables, authorization_id, generated_booking_id, now)
            })
            .await
    }

    /// Close the loop: book the authorized procedure. One transaction
    /// reserves the slot, creates the booking with its execution record, and
    /// consumes the authorization, so a consumed authorization always has its
    /// booking.
    pub async fn redeem(
        &self,
        authorization_id: Uuid,
        slot_id: Uuid,
        channel: BookingChannel,
    ) -> Result<Booking, ScheduleError> {
        let now = Utc::now();
        let booking = self
            .store
            .transaction(move |tables| {
                let authorization = tables.authorization(authorization_id)?.clone();
                if authorization.is_consumed() {
                    return Err(ScheduleError::AlreadyUsed { authorization_id });
                }
                if authorization.is_expired(now) {
                    return Err(ScheduleError::Expired {
                        authorization_id,
                        expired_at: authorization.expires_at,
                    });
                }

                let slot = tables.slot(slot_id)?.clone();
                let service = tables.service(slot.service_id)?.clone();
                if !authorization.procedure_kind.matches_category(service.category) {
                    return Err(ScheduleError::Validation(format!(
                        "slot {} offers a {} service; the authorization covers a {}",
                        slot_id, service.category, authorization.procedure_kind
                    )));
                }

                let (booking, _) =
                    create_in_tx(tables, authorization.patient_id, slot_id, channel, now)?;
                consume_in_tx(tables, authorization_id, booking.id, now)?;
                Ok(booking)
            })
            .await?;

        info!(
            "authorization {} redeemed into booking {}",
            authorization_id, booking.id
        );
        emit(
            self.sink.as_ref(),
            NotificationEvent::for_patient(
                booking.patient_id,
                NotificationCategory::BookingCreated,
                "Procedimiento agendado",
                "Su procedimiento autorizado fue agendado.",
            )
            .about_booking(booking.id)
            .about_authorization(authorization_id),
        )
        .await;

        Ok(booking)
    }

    /// A patient's redeemable authorizations, grouped by procedure kind and
    /// ordered by how soon they expire.
    pub async fn list_pending(&self, patient_id: Uuid) -> PendingAuthorizations {
        let now = Utc::now();
        self.store
            .read(move |tables| {
                let mut pending = PendingAuthorizations::default();
                for authorization in tables.authorizations.values() {
                    if authorization.patient_id != patient_id || !authorization.is_pending(now) {
                        continue;
                    }
                    match authorization.procedure_kind {
                        ProcedureKind::Exam => pending.exams.push(authorization.clone()),
                        ProcedureKind::Operation => pending.operations.push(authorization.clone()),
                    }
                }
                pending.exams.sort_by_key(|a| a.expires_at);
                pending.operations.sort_by_key(|a| a.expires_at);
                pending
            })
            .await
    }

    /// Staff deletion of an unconsumed authorization (expired ones included).
    /// A consumed authorization is part of the booking's history and stays.
    pub async fn delete(&self, authorization_id: Uuid) -> Result<(), ScheduleError> {
        self.store
            .transaction(move |tables| {
                let authorization = tables.authorization(authorization_id)?;
                if authorization.is_consumed() {
                    return Err(ScheduleError::AlreadyUsed { authorization_id });
                }
                tables.authorizations.remove(&authorization_id);
                Ok(())
            })
            .await?;

        warn!("authorization {} deleted by staff", authorization_id);
        Ok(())
    }
}

/// In-transaction consumption guard: single-use, unexpired, then `used_at`
/// and `generated_booking_id` set together. Never changes again.
pub fn consume_in_tx(
    tables: &mut Tables,
    authorization_id: Uuid,
    generated_booking_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ProcedureAuthorization, ScheduleError> {
    let authorization = tables.authorization_mut(authorization_id)?;
    if authorization.is_consumed() {
        return Err(ScheduleError::AlreadyUsed { authorization_id });
    }
    if authorization.is_expired(now) {
        return Err(ScheduleError::Expired {
            authorization_id,
            expired_at: authorization.expires_at,
        });
    }
    authorization.used_at = Some(now);
    authorization.generated_booking_id = Some(generated_booking_id);
    Ok(authorization.clone())
}

fn check_candidate(
    tables: &Tables,
    doctor_id: Uuid,
    required_specialty: &Option<String>,
) -> Result<(), ScheduleError> {
    let candidate = tables.doctor(doctor_id)?;
    if let Some(required) = required_specialty {
        if candidate.specialty != *required {
            return Err(ScheduleError::SpecialtyMismatch {
                required: required.clone(),
                actual: candidate.specialty.clone(),
            });
        }
    }
    Ok(())
}
