use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use uuid::Uuid;

use authorization_cell::models::IssueAuthorizationRequest;
use authorization_cell::services::authorization::ProcedureAuthorizationService;
use notification_cell::{NotificationCategory, RecordingSink};
use shared_config::SchedulerConfig;
use shared_database::{ClinicStore, Tables};
use shared_models::{
    Booking, BookingChannel, BookingState, ExecutionDetail, ProcedureAuthorization, ProcedureKind,
    ScheduleError, SlotState, TimeSlot,
};
use shared_utils::test_utils::{
    hm, plant_confirmed_booking, plant_slot, seeded_store, today, tomorrow, TestCatalog,
};

struct Harness {
    store: Arc<ClinicStore>,
    sink: Arc<RecordingSink>,
    authorizations: ProcedureAuthorizationService,
    catalog: TestCatalog,
    patient_id: Uuid,
    /// The consultation's execution record authorizations derive from.
    appointment_record_id: Uuid,
}

async fn harness() -> Harness {
    let (store, catalog) = seeded_store().await;
    let store = Arc::new(store);
    let sink = Arc::new(RecordingSink::new());
    let authorizations =
        ProcedureAuthorizationService::new(Arc::clone(&store), sink.clone(), &SchedulerConfig::default());

    let patient_id = Uuid::new_v4();
    let appointment_record_id = store
        .transaction(|tables| {
            let slot = plant_slot(
                tables,
                catalog.cardiologist.id,
                catalog.consultation.id,
                today(),
                hm(8, 0),
                hm(8, 30),
                SlotState::Occupied,
            );
            let (_, record) = plant_confirmed_booking(
                tables,
                patient_id,
                &slot,
                ExecutionDetail::Appointment {
                    diagnosis: Some("Evaluación cardiológica".to_string()),
                    follow_up_notes: None,
                },
            );
            Ok(record.id)
        })
        .await
        .expect("plant consultation");

    Harness {
        store,
        sink,
        authorizations,
        catalog,
        patient_id,
        appointment_record_id,
    }
}

fn exam_request(h: &Harness) -> IssueAuthorizationRequest {
    IssueAuthorizationRequest {
        appointment_id: h.appointment_record_id,
        doctor_id: h.catalog.cardiologist.id,
        procedure_kind: ProcedureKind::Exam,
        service_id: h.catalog.cardiology_exam.id,
        required_specialty: None,
        assigned_doctor_id: None,
    }
}

fn plant_authorization(
    tables: &mut Tables,
    h: &Harness,
    kind: ProcedureKind,
    service_id: Uuid,
    expires_in: Duration,
) -> ProcedureAuthorization {
    let now = Utc::now();
    let authorization = ProcedureAuthorization {
        id: Uuid::new_v4(),
        source_appointment_id: h.appointment_record_id,
        patient_id: h.patient_id,
        authorizing_doctor_id: h.catalog.cardiologist.id,
        procedure_kind: kind,
        service_id,
        required_specialty: None,
        assigned_doctor_id: None,
        issued_at: now,
        expires_at: now + expires_in,
        used_at: None,
        generated_booking_id: None,
    };
    tables
        .authorizations
        .insert(authorization.id, authorization.clone());
    authorization
}

fn plant_exam_slot(tables: &mut Tables, h: &Harness, state: SlotState) -> TimeSlot {
    plant_slot(
        tables,
        h.catalog.cardiologist.id,
        h.catalog.cardiology_exam.id,
        tomorrow(),
        hm(9, 0),
        hm(9, 30),
        state,
    )
}

fn plant_spare_booking(tables: &mut Tables, h: &Harness) -> Booking {
    let slot = plant_slot(
        tables,
        h.catalog.cardiologist.id,
        h.catalog.cardiology_exam.id,
        tomorrow(),
        hm(11, 0),
        hm(11, 30),
        SlotState::Occupied,
    );
    let (booking, _) = plant_confirmed_booking(
        tables,
        h.patient_id,
        &slot,
        ExecutionDetail::Exam {
            results: None,
            performed_by: None,
        },
    );
    booking
}

#[tokio::test]
async fn test_issue_exam_matching_specialty_auto_assigns_issuer() {
    let h = harness().await;

    let authorization = h
        .authorizations
        .issue(exam_request(&h))
        .await
        .expect("issue succeeds");

    assert_eq!(authorization.procedure_kind, ProcedureKind::Exam);
    assert_eq!(
        authorization.assigned_doctor_id,
        Some(h.catalog.cardiologist.id),
        "issuer auto-assigns on matching specialty"
    );
    assert_eq!(
        authorization.required_specialty.as_deref(),
        Some("Cardiología"),
        "required specialty inherited from the service"
    );
    assert_eq!(
        authorization.expires_at - authorization.issued_at,
        Duration::days(7)
    );
    assert!(authorization.used_at.is_none());

    assert_eq!(h.sink.count(NotificationCategory::AuthorizationIssued), 1);
    assert_eq!(h.sink.count(NotificationCategory::AuthorizationAssigned), 1);
}

#[tokio::test]
async fn test_issue_exam_specialty_mismatch_is_rejected() {
    let h = harness().await;

    let result = h
        .authorizations
        .issue(IssueAuthorizationRequest {
            doctor_id: h.catalog.neurologist.id,
            ..exam_request(&h)
        })
        .await;

    assert_matches!(
        result,
        Err(ScheduleError::SpecialtyMismatch { ref required, ref actual })
            if required == "Cardiología" && actual == "Neurología"
    );
}

#[tokio::test]
async fn test_issue_operation_without_assignee_must_derive() {
    let h = harness().await;

    // A cardiologist issuing a neurology operation with no assignee.
    let result = h
        .authorizations
        .issue(IssueAuthorizationRequest {
            appointment_id: h.appointment_record_id,
            doctor_id: h.catalog.cardiologist.id,
            procedure_kind: ProcedureKind::Operation,
            service_id: h.catalog.neurology_operation.id,
            required_specialty: None,
            assigned_doctor_id: None,
        })
        .await;

    assert_matches!(
        result,
        Err(ScheduleError::MustDeriveToSpecialist { ref required }) if required == "Neurología"
    );
}

#[tokio::test]
async fn test_issue_operation_with_specialist_assignee_succeeds() {
    let h = harness().await;

    let authorization = h
        .authorizations
        .issue(IssueAuthorizationRequest {
            appointment_id: h.appointment_record_id,
            doctor_id: h.catalog.cardiologist.id,
            procedure_kind: ProcedureKind::Operation,
            service_id: h.catalog.neurology_operation.id,
            required_specialty: None,
            assigned_doctor_id: Some(h.catalog.neurologist.id),
        })
        .await
        .expect("derivation to the specialist succeeds");

    assert_eq!(
        authorization.assigned_doctor_id,
        Some(h.catalog.neurologist.id)
    );
}

#[tokio::test]
async fn test_issue_from_non_consultation_record_is_rejected() {
    let h = harness().await;

    let exam_record_id = h
        .store
        .transaction(|tables| {
            let slot = plant_exam_slot(tables, &h, SlotState::Occupied);
            let (_, record) = plant_confirmed_booking(
                tables,
                h.patient_id,
                &slot,
                ExecutionDetail::Exam {
                    results: None,
                    performed_by: None,
                },
            );
            Ok(record.id)
        })
        .await
        .expect("plant exam record");

    let result = h
        .authorizations
        .issue(IssueAuthorizationRequest {
            appointment_id: exam_record_id,
            ..exam_request(&h)
        })
        .await;
    assert_matches!(result, Err(ScheduleError::Validation(_)));
}

#[tokio::test]
async fn test_assign_enforces_specialty() {
    let h = harness().await;
    let authorization = h
        .authorizations
        .issue(exam_request(&h))
        .await
        .expect("issue succeeds");

    let mismatch = h
        .authorizations
        .assign(authorization.id, h.catalog.neurologist.id)
        .await;
    assert_matches!(mismatch, Err(ScheduleError::SpecialtyMismatch { .. }));

    let reassigned = h
        .authorizations
        .assign(authorization.id, h.catalog.cardiologist.id)
        .await
        .expect("matching specialty assigns");
    assert_eq!(
        reassigned.assigned_doctor_id,
        Some(h.catalog.cardiologist.id)
    );
}

#[tokio::test]
async fn test_consume_is_single_use() {
    let h = harness().await;
    let (authorization, booking) = h
        .store
        .transaction(|tables| {
            let authorization = plant_authorization(
                tables,
                &h,
                ProcedureKind::Exam,
                h.catalog.cardiology_exam.id,
                Duration::days(7),
            );
            let booking = plant_spare_booking(tables, &h);
            Ok((authorization, booking))
        })
        .await
        .expect("plant fixtures");

    let consumed = h
        .authorizations
        .consume(authorization.id, booking.id)
        .await
        .expect("first consumption succeeds");
    assert!(consumed.used_at.is_some());
    assert_eq!(consumed.generated_booking_id, Some(booking.id));

    let again = h.authorizations.consume(authorization.id, booking.id).await;
    assert_matches!(again, Err(ScheduleError::AlreadyUsed { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumption_has_exactly_one_winner() {
    let h = harness().await;
    let (authorization, booking) = h
        .store
        .transaction(|tables| {
            let authorization = plant_authorization(
                tables,
                &h,
                ProcedureKind::Exam,
                h.catalog.cardiology_exam.id,
                Duration::days(7),
            );
            let booking = plant_spare_booking(tables, &h);
            Ok((authorization, booking))
        })
        .await
        .expect("plant fixtures");

    let service = Arc::new(h.authorizations);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        let authorization_id = authorization.id;
        let booking_id = booking.id;
        handles.push(tokio::spawn(async move {
            service.consume(authorization_id, booking_id).await
        }));
    }

    let results = futures::future::join_all(handles).await;
    let mut winners = 0;
    let mut already_used = 0;
    for result in results {
        match result.expect("task must not panic") {
            Ok(_) => winners += 1,
            Err(ScheduleError::AlreadyUsed { .. }) => already_used += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(already_used, 7);
}

#[tokio::test]
async fn test_expiry_is_monotonic_around_the_boundary() {
    let h = harness().await;
    let (lapsed, fresh, booking) = h
        .store
        .transaction(|tables| {
            let lapsed = plant_authorization(
                tables,
                &h,
                ProcedureKind::Exam,
                h.catalog.cardiology_exam.id,
                Duration::seconds(-1),
            );
            let fresh = plant_authorization(
                tables,
                &h,
                ProcedureKind::Exam,
                h.catalog.cardiology_exam.id,
                Duration::seconds(1) + Duration::minutes(1),
            );
            let booking = plant_spare_booking(tables, &h);
            Ok((lapsed, fresh, booking))
        })
        .await
        .expect("plant fixtures");

    // One second past expiry always fails with Expired.
    let expired = h.authorizations.consume(lapsed.id, booking.id).await;
    assert_matches!(expired, Err(ScheduleError::Expired { .. }));

    // Still inside the validity window: never fails for that reason.
    let consumed = h.authorizations.consume(fresh.id, booking.id).await;
    assert!(consumed.is_ok());
}

#[tokio::test]
async fn test_redeem_books_and_consumes_in_one_step() {
    let h = harness().await;

    let authorization = h
        .authorizations
        .issue(exam_request(&h))
        .await
        .expect("issue succeeds");

    let slot = h
        .store
        .transaction(|tables| Ok(plant_exam_slot(tables, &h, SlotState::Available)))
        .await
        .expect("plant exam slot");

    let booking = h
        .authorizations
        .redeem(authorization.id, slot.id, BookingChannel::SelfService)
        .await
        .expect("redeem succeeds");

    assert_eq!(booking.patient_id, h.patient_id);
    assert_eq!(booking.state, BookingState::Confirmed);

    let (slot_state, stored) = h
        .store
        .read(|tables| {
            (
                tables.slots[&slot.id].state,
                tables.authorizations[&authorization.id].clone(),
            )
        })
        .await;
    assert_eq!(slot_state, SlotState::Occupied);
    assert_eq!(stored.generated_booking_id, Some(booking.id));
    assert!(stored.used_at.is_some());

    // The redeemed authorization no longer gates the booking screens.
    let pending = h.authorizations.list_pending(h.patient_id).await;
    assert!(pending.exams.is_empty());
}

#[tokio::test]
async fn test_redeem_rejects_mismatched_slot_category() {
    let h = harness().await;

    let authorization = h
        .authorizations
        .issue(exam_request(&h))
        .await
        .expect("issue succeeds");

    let consultation_slot = h
        .store
        .transaction(|tables| {
            Ok(plant_slot(
                tables,
                h.catalog.cardiologist.id,
                h.catalog.consultation.id,
                tomorrow(),
                hm(9, 0),
                hm(9, 30),
                SlotState::Available,
            ))
        })
        .await
        .expect("plant consultation slot");

    let result = h
        .authorizations
        .redeem(authorization.id, consultation_slot.id, BookingChannel::Staff)
        .await;
    assert_matches!(result, Err(ScheduleError::Validation(_)));

    let slot_state = h
        .store
        .read(|tables| tables.slots[&consultation_slot.id].state)
        .await;
    assert_eq!(slot_state, SlotState::Available, "slot untouched on rejection");
}

#[tokio::test]
async fn test_redeem_expired_authorization_leaves_slot_available() {
    let h = harness().await;
    let (authorization, slot) = h
        .store
        .transaction(|tables| {
            let authorization = plant_authorization(
                tables,
                &h,
                ProcedureKind::Exam,
                h.catalog.cardiology_exam.id,
                Duration::seconds(-1),
            );
            let slot = plant_exam_slot(tables, &h, SlotState::Available);
            Ok((authorization, slot))
        })
        .await
        .expect("plant fixtures");

    let result = h
        .authorizations
        .redeem(authorization.id, slot.id, BookingChannel::Staff)
        .await;
    assert_matches!(result, Err(ScheduleError::Expired { .. }));

    let slot_state = h.store.read(|tables| tables.slots[&slot.id].state).await;
    assert_eq!(slot_state, SlotState::Available);
}

#[tokio::test]
async fn test_list_pending_groups_by_kind_and_hides_spent_ones() {
    let h = harness().await;
    h.store
        .transaction(|tables| {
            plant_authorization(
                tables,
                &h,
                ProcedureKind::Exam,
                h.catalog.cardiology_exam.id,
                Duration::days(7),
            );
            plant_authorization(
                tables,
                &h,
                ProcedureKind::Operation,
                h.catalog.neurology_operation.id,
                Duration::days(3),
            );
            // Expired: not pending.
            plant_authorization(
                tables,
                &h,
                ProcedureKind::Exam,
                h.catalog.cardiology_exam.id,
                Duration::days(-1),
            );
            // Consumed: not pending.
            let spent = plant_authorization(
                tables,
                &h,
                ProcedureKind::Operation,
                h.catalog.neurology_operation.id,
                Duration::days(7),
            );
            let entry = tables.authorization_mut(spent.id)?;
            entry.used_at = Some(Utc::now());
            entry.generated_booking_id = Some(Uuid::new_v4());
            Ok(())
        })
        .await
        .expect("plant authorizations");

    let pending = h.authorizations.list_pending(h.patient_id).await;
    assert_eq!(pending.exams.len(), 1);
    assert_eq!(pending.operations.len(), 1);

    let stranger = h.authorizations.list_pending(Uuid::new_v4()).await;
    assert!(stranger.is_empty());
}

#[tokio::test]
async fn test_delete_only_while_unused() {
    let h = harness().await;
    let (unused, spent) = h
        .store
        .transaction(|tables| {
            // Expired-but-unused is still deletable.
            let unused = plant_authorization(
                tables,
                &h,
                ProcedureKind::Exam,
                h.catalog.cardiology_exam.id,
                Duration::days(-1),
            );
            let spent = plant_authorization(
                tables,
                &h,
                ProcedureKind::Exam,
                h.catalog.cardiology_exam.id,
                Duration::days(7),
            );
            let entry = tables.authorization_mut(spent.id)?;
            entry.used_at = Some(Utc::now());
            entry.generated_booking_id = Some(Uuid::new_v4());
            Ok((unused, spent))
        })
        .await
        .expect("plant authorizations");

    h.authorizations
        .delete(unused.id)
        .await
        .expect("unused authorization deletes");

    let gone = h
        .store
        .read(|tables| tables.authorizations.contains_key(&unused.id))
        .await;
    assert!(!gone);

    let kept = h.authorizations.delete(spent.id).await;
    assert_matches!(kept, Err(ScheduleError::AlreadyUsed { .. }));
}
