use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use notification_cell::{emit, NotificationCategory, NotificationEvent, NotificationSink};
use scheduling_cell::services::slots::{release_in_tx, reserve_in_tx};
use scheduling_cell::ReleaseMode;
use shared_database::{ClinicStore, Tables};
use shared_models::{
    Booking, BookingChannel, BookingState, ExecutionDetail, ExecutionRecord, ExecutionState,
    ScheduleError, ServiceCategory,
};

use crate::models::{CancelBookingRequest, CompleteBookingRequest, CreateBookingRequest};
use crate::services::lifecycle::{within_outcome_window, outcome_window_end, BookingLifecycleService};

/// The booking ledger: reserves slots, spawns execution records and walks
/// bookings through their state machine. All slot flips happen inside the
/// booking's own transaction, so a failed creation leaves the slot untouched.
pub struct BookingService {
    store: Arc<ClinicStore>,
    sink: Arc<dyn NotificationSink>,
    lifecycle: BookingLifecycleService,
}

impl BookingService {
    pub fn new(store: Arc<ClinicStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            store,
            sink,
            lifecycle: BookingLifecycleService::new(),
        }
    }

    /// Reserve the slot and create the booking plus its execution record in
    /// one transaction.
    pub async fn create(&self, request: CreateBookingRequest) -> Result<Booking, ScheduleError> {
        debug!(
            "booking slot {} for patient {}",
            request.slot_id, request.patient_id
        );

        let now = Utc::now();
        let booking = self
            .store
            .transaction(move |tables| {
                let (booking, _) = create_in_tx(
                    tables,
                    request.patient_id,
                    request.slot_id,
                    request.channel,
                    now,
                )?;
                Ok(booking)
            })
            .await?;

        info!("booking {} created for slot {}", booking.id, booking.time_slot_id);
        emit(
            self.sink.as_ref(),
            NotificationEvent::for_patient(
                booking.patient_id,
                NotificationCategory::BookingCreated,
                "Reserva registrada",
                "Su reserva fue registrada y el horario quedó confirmado.",
            )
            .about_booking(booking.id),
        )
        .await;

        Ok(booking)
    }

    /// Cancel a booking and reopen its slot. Completed and no-show bookings
    /// cannot be cancelled.
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        request: CancelBookingRequest,
    ) -> Result<Booking, ScheduleError> {
        debug!("cancelling booking {} ({:?})", booking_id, request.cancelled_by);

        let now = Utc::now();
        let reason = request.reason.clone();
        let booking = self
            .store
            .transaction(move |tables| cancel_in_tx(tables, booking_id, reason, now))
            .await?;

        info!("booking {} cancelled", booking_id);
        emit(
            self.sink.as_ref(),
            NotificationEvent::for_patient(
                booking.patient_id,
                NotificationCategory::BookingCancelled,
                "Reserva cancelada",
                format!("Su reserva fue cancelada: {}", request.reason),
            )
            .about_booking(booking.id),
        )
        .await;

        Ok(booking)
    }

    /// Record the clinical outcome and complete the booking. Only the slot's
    /// provider may complete, and only within the same-day window unless a
    /// staff override is supplied.
    pub async fn complete(
        &self,
        booking_id: Uuid,
        request: CompleteBookingRequest,
    ) -> Result<Booking, ScheduleError> {
        let now = Utc::now();
        let lifecycle = &self.lifecycle;
        let provider_id = request.provider_id;
        let override_window = request.override_window;
        let outcome = request.outcome;
        let booking = self
            .store
            .transaction(move |tables| {
                let booking = tables.booking(booking_id)?.clone();
                lifecycle.validate_transition(&booking.state, &BookingState::Completed)?;

                let slot = tables.slot(booking.time_slot_id)?.clone();
                if slot.provider_id != provider_id {
                    return Err(ScheduleError::Unauthorized { actor: provider_id });
                }
                if !override_window && !within_outcome_window(slot.starts_at(), slot.date, now) {
                    return Err(ScheduleError::OutOfWindow {
                        booking_id,
                        window_end: outcome_window_end(slot.date),
                    });
                }

                let entry = tables.booking_mut(booking_id)?;
                entry.state = BookingState::Completed;
                entry.updated_at = now;
                let updated = entry.clone();

                if let Some(record) = tables.execution_for_booking_mut(booking_id) {
                    record.state = ExecutionState::Completed;
                    record.detail.record_outcome(outcome);
                    record.updated_at = now;
                }
                Ok(updated)
            })
            .await?;

        info!("booking {} completed by provider {}", booking_id, provider_id);
        emit(
            self.sink.as_ref(),
            NotificationEvent::for_patient(
                booking.patient_id,
                NotificationCategory::StatusChanged,
                "Atención registrada",
                "Su atención fue registrada como completada.",
            )
            .about_booking(booking.id),
        )
        .await;

        Ok(booking)
    }

    /// Batch: mark past confirmed bookings with no recorded outcome as
    /// no-shows. Idempotent; an existing outcome is never overwritten.
    pub async fn mark_no_shows(&self, now: DateTime<Utc>) -> Result<usize, ScheduleError> {
        let marked = self
            .store
            .transaction(move |tables| {
                let candidates: Vec<Uuid> = tables
                    .bookings
                    .values()
                    .filter(|booking| booking.state == BookingState::Confirmed)
                    .filter(|booking| {
                        tables
                            .slots
                            .get(&booking.time_slot_id)
                            .map_or(false, |slot| slot.ends_at() < now)
                    })
                    .filter(|booking| {
                        tables
                            .execution_for_booking(booking.id)
                            .map_or(true, |record| !record.detail.has_outcome())
                    })
                    .map(|booking| booking.id)
                    .collect();

                for booking_id in &candidates {
                    let booking = tables.booking_mut(*booking_id)?;
                    booking.state = BookingState::NoShow;
                    booking.updated_at = now;
                    if let Some(record) = tables.execution_for_booking_mut(*booking_id) {
                        if record.state != ExecutionState::Completed {
                            record.state = ExecutionState::Cancelled;
                            record.updated_at = now;
                        }
                    }
                }
                Ok(candidates.len())
            })
            .await?;

        if marked > 0 {
            info!("marked {} past bookings as no-show", marked);
        }
        Ok(marked)
    }

    pub async fn get(&self, booking_id: Uuid) -> Result<Booking, ScheduleError> {
        self.store
            .read(move |tables| tables.booking(booking_id).cloned())
            .await
    }

    /// A patient's bookings, newest first.
    pub async fn list_for_patient(&self, patient_id: Uuid) -> Vec<Booking> {
        self.store
            .read(move |tables| {
                let mut bookings: Vec<Booking> = tables
                    .bookings
                    .values()
                    .filter(|b| b.patient_id == patient_id)
                    .cloned()
                    .collect();
                bookings.sort_by_key(|b| std::cmp::Reverse(b.registered_at));
                bookings
            })
            .await
    }
}

/// In-transaction booking creation, shared with the change-request and
/// authorization transactions. Reserves the slot, then creates the booking
/// and the execution record matching the slot's service category; any failure
/// rolls the slot flip back with the rest.
pub fn create_in_tx(
    tables: &mut Tables,
    patient_id: Uuid,
    slot_id: Uuid,
    channel: BookingChannel,
    now: DateTime<Utc>,
) -> Result<(Booking, ExecutionRecord), ScheduleError> {
    let slot = reserve_in_tx(tables, slot_id, now)?;
    let service = tables.service(slot.service_id)?.clone();

    let booking = Booking {
        id: Uuid::new_v4(),
        patient_id,
        time_slot_id: slot_id,
        channel,
        registered_at: now,
        state: BookingState::Confirmed,
        cancellation_reason: None,
        cancelled_at: None,
        updated_at: now,
    };

    let detail = match service.category {
        ServiceCategory::Consultation => ExecutionDetail::Appointment {
            diagnosis: None,
            follow_up_notes: None,
        },
        ServiceCategory::Exam => ExecutionDetail::Exam {
            results: None,
            performed_by: None,
        },
        ServiceCategory::Operation => ExecutionDetail::Operation {
            surgical_notes: None,
            outcome: None,
        },
    };
    let record = ExecutionRecord {
        id: Uuid::new_v4(),
        booking_id: booking.id,
        state: ExecutionState::Pending,
        detail,
        created_at: now,
        updated_at: now,
    };

    tables.bookings.insert(booking.id, booking.clone());
    tables.execution_records.insert(record.id, record.clone());
    Ok((booking, record))
}

/// In-transaction cancellation, shared with the change-request approval path.
pub fn cancel_in_tx(
    tables: &mut Tables,
    booking_id: Uuid,
    reason: String,
    now: DateTime<Utc>,
) -> Result<Booking, ScheduleError> {
    let booking = tables.booking(booking_id)?.clone();
    BookingLifecycleService::new().validate_transition(&booking.state, &BookingState::Cancelled)?;

    release_in_tx(tables, booking.time_slot_id, ReleaseMode::Reopen, now)?;

    let entry = tables.booking_mut(booking_id)?;
    entry.state = BookingState::Cancelled;
    entry.cancellation_reason = Some(reason);
    entry.cancelled_at = Some(now);
    entry.updated_at = now;
    let cancelled = entry.clone();

    if let Some(record) = tables.execution_for_booking_mut(booking_id) {
        if record.state != ExecutionState::Completed {
            record.state = ExecutionState::Cancelled;
            record.updated_at = now;
        }
    }
    Ok(cancelled)
}
