use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use notification_cell::{emit, NotificationCategory, NotificationEvent, NotificationSink};
use scheduling_cell::services::slots::{release_in_tx, reserve_in_tx};
use scheduling_cell::ReleaseMode;
use shared_database::ClinicStore;
use shared_models::{
    BookingState, ChangeRequest, ChangeRequestKind, ChangeRequestState, EntityKind, ScheduleError,
    SlotState,
};

use crate::services::booking::cancel_in_tx;

/// Limit on approved reprogram requests per booking; the third approval is
/// rejected by policy.
pub const MAX_APPROVED_REPROGRAMS: usize = 2;

/// Staff-mediated reprogram/cancel workflow. Requests are created by patients
/// or staff and resolved by staff; once resolved they never change again.
///
/// The reprogram bound is enforced where it is authoritative: at approval,
/// inside the transaction that moves the booking. A request filed after the
/// limit is reached is still accepted and then rejected on approval, since the
/// approved count can change between filing and resolution anyway.
pub struct ChangeRequestService {
    store: Arc<ClinicStore>,
    sink: Arc<dyn NotificationSink>,
}

impl ChangeRequestService {
    pub fn new(store: Arc<ClinicStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// File a reprogram request against an available target slot.
    pub async fn request_reprogram(
        &self,
        booking_id: Uuid,
        target_slot_id: Uuid,
        reason: String,
    ) -> Result<ChangeRequest, ScheduleError> {
        debug!(
            "reprogram request for booking {} to slot {}",
            booking_id, target_slot_id
        );

        let now = Utc::now();
        self.store
            .transaction(move |tables| {
                let booking = tables.booking(booking_id)?;
                if !matches!(booking.state, BookingState::Pending | BookingState::Confirmed) {
                    return Err(ScheduleError::Validation(format!(
                        "booking {} cannot be reprogrammed in state {}",
                        booking_id, booking.state
                    )));
                }
                let target = tables.slot(target_slot_id)?;
                if target.state != SlotState::Available {
                    return Err(ScheduleError::SlotUnavailable {
                        slot_id: target_slot_id,
                        state: target.state,
                    });
                }

                let request = ChangeRequest {
                    id: Uuid::new_v4(),
                    booking_id,
                    kind: ChangeRequestKind::Reprogram,
                    reason,
                    requested_at: now,
                    state: ChangeRequestState::Pending,
                    target_time_slot_id: Some(target_slot_id),
                    resolution: None,
                    resolved_at: None,
                };
                tables.change_requests.insert(request.id, request.clone());
                Ok(request)
            })
            .await
    }

    /// Approve a reprogram: reserve the target, supersede the old slot,
    /// repoint the booking and resolve the request, all in one transaction.
    /// Any guard failure leaves the request Pending and the slots untouched.
    pub async fn approve_reprogram(
        &self,
        request_id: Uuid,
        resolver_comment: String,
    ) -> Result<ChangeRequest, ScheduleError> {
        let now = Utc::now();
        let (request, booking, old_slot, new_slot) = self
            .store
            .transaction(move |tables| {
                let request = tables.change_request(request_id)?.clone();
                ensure_pending(&request, ChangeRequestKind::Reprogram)?;
                let target_slot_id = request.target_time_slot_id.ok_or_else(|| {
                    ScheduleError::Validation(format!(
                        "reprogram request {} has no target slot",
                        request_id
                    ))
                })?;

                let booking = tables.booking(request.booking_id)?.clone();
                let approved = tables.approved_reprogram_count(request.booking_id);
                if approved >= MAX_APPROVED_REPROGRAMS {
                    warn!(
                        "reprogram limit reached for booking {} ({} approved)",
                        request.booking_id, approved
                    );
                    return Err(ScheduleError::LimitExceeded {
                        booking_id: request.booking_id,
                        limit: MAX_APPROVED_REPROGRAMS as u32,
                    });
                }

                let new_slot = reserve_in_tx(tables, target_slot_id, now)?;
                let old_slot =
                    release_in_tx(tables, booking.time_slot_id, ReleaseMode::Supersede, now)?;

                let entry = tables.booking_mut(request.booking_id)?;
                entry.time_slot_id = target_slot_id;
                entry.updated_at = now;
                let booking = entry.clone();

                let resolved = tables.change_request_mut(request_id)?;
                resolved.state = ChangeRequestState::Approved;
                resolved.resolution = Some(resolver_comment);
                resolved.resolved_at = Some(now);

                Ok((resolved.clone(), booking, old_slot, new_slot))
            })
            .await?;

        info!(
            "reprogram request {} approved: booking {} moved from {} to {}",
            request_id, booking.id, old_slot.id, new_slot.id
        );

        let schedule_change = format!(
            "Su reserva se movió de {} {} a {} {}.",
            old_slot.date, old_slot.start_time, new_slot.date, new_slot.start_time
        );
        emit(
            self.sink.as_ref(),
            NotificationEvent::for_patient(
                booking.patient_id,
                NotificationCategory::BookingReprogrammed,
                "Reserva reprogramada",
                schedule_change.clone(),
            )
            .about_booking(booking.id),
        )
        .await;
        emit(
            self.sink.as_ref(),
            NotificationEvent::for_doctor(
                new_slot.provider_id,
                NotificationCategory::BookingReprogrammed,
                "Agenda actualizada",
                schedule_change,
            )
            .about_booking(booking.id),
        )
        .await;

        Ok(request)
    }

    /// File a cancellation request.
    pub async fn request_cancel(
        &self,
        booking_id: Uuid,
        reason: String,
    ) -> Result<ChangeRequest, ScheduleError> {
        debug!("cancel request for booking {}", booking_id);

        let now = Utc::now();
        self.store
            .transaction(move |tables| {
                let booking = tables.booking(booking_id)?;
                if !matches!(booking.state, BookingState::Pending | BookingState::Confirmed) {
                    return Err(ScheduleError::Validation(format!(
                        "booking {} cannot be cancelled in state {}",
                        booking_id, booking.state
                    )));
                }

                let request = ChangeRequest {
                    id: Uuid::new_v4(),
                    booking_id,
                    kind: ChangeRequestKind::Cancel,
                    reason,
                    requested_at: now,
                    state: ChangeRequestState::Pending,
                    target_time_slot_id: None,
                    resolution: None,
                    resolved_at: None,
                };
                tables.change_requests.insert(request.id, request.clone());
                Ok(request)
            })
            .await
    }

    /// Approve a cancellation: the booking is cancelled through the ledger's
    /// own transition (slot reopened, record closed) in the same transaction
    /// that resolves the request.
    pub async fn approve_cancel(
        &self,
        request_id: Uuid,
        resolver_comment: String,
    ) -> Result<ChangeRequest, ScheduleError> {
        let now = Utc::now();
        let (request, booking) = self
            .store
            .transaction(move |tables| {
                let request = tables.change_request(request_id)?.clone();
                ensure_pending(&request, ChangeRequestKind::Cancel)?;

                let booking = cancel_in_tx(tables, request.booking_id, request.reason.clone(), now)?;

                let resolved = tables.change_request_mut(request_id)?;
                resolved.state = ChangeRequestState::Approved;
                resolved.resolution = Some(resolver_comment);
                resolved.resolved_at = Some(now);
                Ok((resolved.clone(), booking))
            })
            .await?;

        info!("cancel request {} approved for booking {}", request_id, booking.id);
        emit(
            self.sink.as_ref(),
            NotificationEvent::for_patient(
                booking.patient_id,
                NotificationCategory::BookingCancelled,
                "Reserva cancelada",
                format!("Su solicitud de cancelación fue aprobada: {}", request.reason),
            )
            .about_booking(booking.id),
        )
        .await;

        Ok(request)
    }

    /// Reject a pending request of either kind; the booking stays untouched.
    pub async fn reject(
        &self,
        request_id: Uuid,
        resolver_comment: String,
    ) -> Result<ChangeRequest, ScheduleError> {
        let now = Utc::now();
        let request = self
            .store
            .transaction(move |tables| {
                let request = tables.change_request(request_id)?;
                if request.state != ChangeRequestState::Pending {
                    return Err(ScheduleError::InvalidTransition {
                        entity: EntityKind::ChangeRequest,
                        from: request.state.to_string(),
                        to: ChangeRequestState::Rejected.to_string(),
                    });
                }
                let entry = tables.change_request_mut(request_id)?;
                entry.state = ChangeRequestState::Rejected;
                entry.resolution = Some(resolver_comment);
                entry.resolved_at = Some(now);
                Ok(entry.clone())
            })
            .await?;

        info!("change request {} rejected", request_id);
        Ok(request)
    }

    /// Requests filed against a booking, newest first.
    pub async fn list_for_booking(&self, booking_id: Uuid) -> Vec<ChangeRequest> {
        self.store
            .read(move |tables| {
                let mut requests: Vec<ChangeRequest> = tables
                    .change_requests
                    .values()
                    .filter(|r| r.booking_id == booking_id)
                    .cloned()
                    .collect();
                requests.sort_by_key(|r| std::cmp::Reverse(r.requested_at));
                requests
            })
            .await
    }
}

fn ensure_pending(request: &ChangeRequest, kind: ChangeRequestKind) -> Result<(), ScheduleError> {
    if request.state != ChangeRequestState::Pending {
        return Err(ScheduleError::InvalidTransition {
            entity: EntityKind::ChangeRequest,
            from: request.state.to_string(),
            to: ChangeRequestState::Approved.to_string(),
        });
    }
    if request.kind != kind {
        return Err(ScheduleError::Validation(format!(
            "request {} is a {} request, not a {} request",
            request.id, request.kind, kind
        )));
    }
    Ok(())
}
