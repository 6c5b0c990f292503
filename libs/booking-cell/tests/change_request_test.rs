use std::sync::Arc;

use assert_matches::assert_matches;
use uuid::Uuid;

use booking_cell::services::change_request::{ChangeRequestService, MAX_APPROVED_REPROGRAMS};
use notification_cell::{NotificationCategory, RecordingSink};
use shared_database::ClinicStore;
use shared_models::{
    Booking, ChangeRequestState, ExecutionDetail, ScheduleError, SlotState, TimeSlot,
};
use shared_utils::test_utils::{
    hm, plant_confirmed_booking, plant_slot, seeded_store, today, tomorrow, TestCatalog,
};

struct Harness {
    store: Arc<ClinicStore>,
    sink: Arc<RecordingSink>,
    requests: ChangeRequestService,
    catalog: TestCatalog,
    booking: Booking,
    original_slot: TimeSlot,
}

/// Seeds a confirmed consultation booking plus `free_slots` open slots to
/// reprogram onto.
async fn harness(free_slots: usize) -> (Harness, Vec<TimeSlot>) {
    let (store, catalog) = seeded_store().await;
    let store = Arc::new(store);
    let sink = Arc::new(RecordingSink::new());
    let requests = ChangeRequestService::new(Arc::clone(&store), sink.clone());

    let (booking, original_slot, targets) = store
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
            let (booking, _) = plant_confirmed_booking(
                tables,
                Uuid::new_v4(),
                &slot,
                ExecutionDetail::Appointment {
                    diagnosis: None,
                    follow_up_notes: None,
                },
            );
            let targets: Vec<TimeSlot> = (0..free_slots)
                .map(|i| {
                    plant_slot(
                        tables,
                        catalog.cardiologist.id,
                        catalog.consultation.id,
                        tomorrow(),
                        hm(9 + i as u32, 0),
                        hm(9 + i as u32, 30),
                        SlotState::Available,
                    )
                })
                .collect();
            Ok((booking, slot, targets))
        })
        .await
        .expect("plant fixtures");

    (
        Harness {
            store,
            sink,
            requests,
            catalog,
            booking,
            original_slot,
        },
        targets,
    )
}

#[tokio::test]
async fn test_request_reprogram_requires_available_target() {
    let (h, _) = harness(0).await;

    let occupied_target = h
        .store
        .transaction(|tables| {
            Ok(plant_slot(
                tables,
                h.catalog.cardiologist.id,
                h.catalog.consultation.id,
                tomorrow(),
                hm(9, 0),
                hm(9, 30),
                SlotState::Occupied,
            ))
        })
        .await
        .expect("plant occupied target");

    let result = h
        .requests
        .request_reprogram(h.booking.id, occupied_target.id, "viaje".to_string())
        .await;
    assert_matches!(result, Err(ScheduleError::SlotUnavailable { .. }));
}

#[tokio::test]
async fn test_approve_reprogram_moves_booking_atomically() {
    let (h, targets) = harness(1).await;

    let request = h
        .requests
        .request_reprogram(h.booking.id, targets[0].id, "viaje".to_string())
        .await
        .expect("request filed");
    assert_eq!(request.state, ChangeRequestState::Pending);

    let approved = h
        .requests
        .approve_reprogram(request.id, "aprobado por recepción".to_string())
        .await
        .expect("approval succeeds");
    assert_eq!(approved.state, ChangeRequestState::Approved);
    assert!(approved.resolved_at.is_some());

    let (booking_slot, old_state, new_state) = h
        .store
        .read(|tables| {
            (
                tables.bookings[&h.booking.id].time_slot_id,
                tables.slots[&h.original_slot.id].state,
                tables.slots[&targets[0].id].state,
            )
        })
        .await;
    assert_eq!(booking_slot, targets[0].id);
    assert_eq!(old_state, SlotState::Superseded);
    assert_eq!(new_state, SlotState::Occupied);

    // Patient and provider are both told about the move.
    assert_eq!(h.sink.count(NotificationCategory::BookingReprogrammed), 2);
}

#[tokio::test]
async fn test_approve_reprogram_leaves_request_pending_when_target_taken() {
    let (h, targets) = harness(1).await;

    let request = h
        .requests
        .request_reprogram(h.booking.id, targets[0].id, "viaje".to_string())
        .await
        .expect("request filed");

    // Someone else takes the target slot between filing and approval.
    h.store
        .transaction(|tables| {
            tables.slot_mut(targets[0].id)?.state = SlotState::Occupied;
            Ok(())
        })
        .await
        .expect("occupy target");

    let result = h
        .requests
        .approve_reprogram(request.id, "aprobado".to_string())
        .await;
    assert_matches!(result, Err(ScheduleError::SlotUnavailable { .. }));

    let (request_state, booking_slot, original_state) = h
        .store
        .read(|tables| {
            (
                tables.change_requests[&request.id].state,
                tables.bookings[&h.booking.id].time_slot_id,
                tables.slots[&h.original_slot.id].state,
            )
        })
        .await;
    assert_eq!(request_state, ChangeRequestState::Pending);
    assert_eq!(booking_slot, h.original_slot.id, "booking unmoved");
    assert_eq!(original_state, SlotState::Occupied, "original slot untouched");
}

#[tokio::test]
async fn test_third_reprogram_approval_hits_the_limit() {
    let (h, targets) = harness(3).await;

    for target in targets.iter().take(MAX_APPROVED_REPROGRAMS) {
        let request = h
            .requests
            .request_reprogram(h.booking.id, target.id, "cambio".to_string())
            .await
            .expect("request filed");
        h.requests
            .approve_reprogram(request.id, "ok".to_string())
            .await
            .expect("approval succeeds under the limit");
    }

    // The third request is still accepted...
    let third = h
        .requests
        .request_reprogram(h.booking.id, targets[2].id, "otro cambio".to_string())
        .await
        .expect("third request is accepted");

    // ...but approving it breaches the bound.
    let result = h
        .requests
        .approve_reprogram(third.id, "ok".to_string())
        .await;
    assert_matches!(
        result,
        Err(ScheduleError::LimitExceeded { limit: 2, .. })
    );

    let (request_state, target_state) = h
        .store
        .read(|tables| {
            (
                tables.change_requests[&third.id].state,
                tables.slots[&targets[2].id].state,
            )
        })
        .await;
    assert_eq!(request_state, ChangeRequestState::Pending);
    assert_eq!(target_state, SlotState::Available, "target slot not reserved");
}

#[tokio::test]
async fn test_resolved_request_cannot_be_resolved_again() {
    let (h, targets) = harness(1).await;

    let request = h
        .requests
        .request_reprogram(h.booking.id, targets[0].id, "viaje".to_string())
        .await
        .expect("request filed");
    h.requests
        .approve_reprogram(request.id, "ok".to_string())
        .await
        .expect("approval succeeds");

    let again = h.requests.approve_reprogram(request.id, "ok".to_string()).await;
    assert_matches!(again, Err(ScheduleError::InvalidTransition { .. }));

    let rejected = h.requests.reject(request.id, "tarde".to_string()).await;
    assert_matches!(rejected, Err(ScheduleError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_cancel_request_approval_cancels_via_ledger() {
    let (h, _) = harness(0).await;

    let request = h
        .requests
        .request_cancel(h.booking.id, "personal".to_string())
        .await
        .expect("cancel request filed");

    let approved = h
        .requests
        .approve_cancel(request.id, "aprobado".to_string())
        .await
        .expect("approval succeeds");
    assert_eq!(approved.state, ChangeRequestState::Approved);

    let (booking_state, slot_state) = h
        .store
        .read(|tables| {
            (
                tables.bookings[&h.booking.id].state,
                tables.slots[&h.original_slot.id].state,
            )
        })
        .await;
    assert_eq!(booking_state, shared_models::BookingState::Cancelled);
    assert_eq!(slot_state, SlotState::Available);
    assert_eq!(h.sink.count(NotificationCategory::BookingCancelled), 1);
}

#[tokio::test]
async fn test_reject_leaves_booking_untouched() {
    let (h, _) = harness(0).await;

    let request = h
        .requests
        .request_cancel(h.booking.id, "personal".to_string())
        .await
        .expect("cancel request filed");

    let rejected = h
        .requests
        .reject(request.id, "fuera de plazo".to_string())
        .await
        .expect("rejection succeeds");
    assert_eq!(rejected.state, ChangeRequestState::Rejected);

    let booking_state = h
        .store
        .read(|tables| tables.bookings[&h.booking.id].state)
        .await;
    assert_eq!(booking_state, shared_models::BookingState::Confirmed);
    assert_eq!(h.sink.events().len(), 0);
}

#[tokio::test]
async fn test_request_against_cancelled_booking_is_rejected() {
    let (h, targets) = harness(1).await;

    let request = h
        .requests
        .request_cancel(h.booking.id, "personal".to_string())
        .await
        .expect("cancel request filed");
    h.requests
        .approve_cancel(request.id, "ok".to_string())
        .await
        .expect("approval succeeds");

    let reprogram = h
        .requests
        .request_reprogram(h.booking.id, targets[0].id, "cambio".to_string())
        .await;
    assert_matches!(reprogram, Err(ScheduleError::Validation(_)));
}
