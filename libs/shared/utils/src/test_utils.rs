//! Shared fixtures for the cells' integration tests: a seeded store with a
//! small catalog and helpers for planting slots and bookings directly.

use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use shared_database::{ClinicStore, Tables};
use shared_models::{
    Availability, Booking, BookingChannel, BookingState, ClinicService, Doctor, ExecutionDetail,
    ExecutionRecord, ExecutionState, ServiceCategory, SlotState, TimeSlot,
};

pub struct TestCatalog {
    pub cardiologist: Doctor,
    pub neurologist: Doctor,
    pub consultation: ClinicService,
    pub cardiology_exam: ClinicService,
    pub neurology_operation: ClinicService,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self {
            cardiologist: Doctor {
                id: Uuid::new_v4(),
                full_name: "Dra. Elena Vargas".to_string(),
                specialty: "Cardiología".to_string(),
            },
            neurologist: Doctor {
                id: Uuid::new_v4(),
                full_name: "Dr. Andrés Soto".to_string(),
                specialty: "Neurología".to_string(),
            },
            consultation: ClinicService {
                id: Uuid::new_v4(),
                name: "Consulta general".to_string(),
                category: ServiceCategory::Consultation,
                required_specialty: None,
                duration_minutes: 30,
            },
            cardiology_exam: ClinicService {
                id: Uuid::new_v4(),
                name: "Electrocardiograma".to_string(),
                category: ServiceCategory::Exam,
                required_specialty: Some("Cardiología".to_string()),
                duration_minutes: 30,
            },
            neurology_operation: ClinicService {
                id: Uuid::new_v4(),
                name: "Cirugía neurológica".to_string(),
                category: ServiceCategory::Operation,
                required_specialty: Some("Neurología".to_string()),
                duration_minutes: 60,
            },
        }
    }
}

impl Default for TestCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// A store pre-seeded with the test catalog.
pub async fn seeded_store() -> (ClinicStore, TestCatalog) {
    let store = ClinicStore::new(Duration::from_secs(2));
    let catalog = TestCatalog::new();
    store
        .register_doctor(catalog.cardiologist.clone())
        .await
        .expect("seed cardiologist");
    store
        .register_doctor(catalog.neurologist.clone())
        .await
        .expect("seed neurologist");
    store
        .register_service(catalog.consultation.clone())
        .await
        .expect("seed consultation");
    store
        .register_service(catalog.cardiology_exam.clone())
        .await
        .expect("seed exam");
    store
        .register_service(catalog.neurology_operation.clone())
        .await
        .expect("seed operation");
    (store, catalog)
}

/// A date inside the current calendar week (today), for listings that default
/// to the weekly view.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Tomorrow, convenient for future-dated fixtures regardless of weekday.
pub fn tomorrow() -> NaiveDate {
    today().succ_opt().expect("tomorrow exists")
}

pub fn yesterday() -> NaiveDate {
    today().pred_opt().expect("yesterday exists")
}

/// Plant an availability row directly.
pub fn plant_availability(
    tables: &mut Tables,
    provider_id: Uuid,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> Availability {
    let now = Utc::now();
    let availability = Availability {
        id: Uuid::new_v4(),
        provider_id,
        date,
        start_time: start,
        end_time: end,
        active: true,
        created_at: now,
        updated_at: now,
    };
    tables
        .availabilities
        .insert(availability.id, availability.clone());
    availability
}

/// Plant a slot row directly, bypassing generation.
pub fn plant_slot(
    tables: &mut Tables,
    provider_id: Uuid,
    service_id: Uuid,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    state: SlotState,
) -> TimeSlot {
    let now = Utc::now();
    let slot = TimeSlot {
        id: Uuid::new_v4(),
        provider_id,
        date,
        start_time: start,
        end_time: end,
        service_id,
        availability_id: Uuid::new_v4(),
        state,
        created_at: now,
        updated_at: now,
    };
    tables.slots.insert(slot.id, slot.clone());
    slot
}

/// Plant a confirmed booking (with its execution record) on an occupied slot.
pub fn plant_confirmed_booking(
    tables: &mut Tables,
    patient_id: Uuid,
    slot: &TimeSlot,
    detail: ExecutionDetail,
) -> (Booking, ExecutionRecord) {
    let now = Utc::now();
    let booking = Booking {
        id: Uuid::new_v4(),
        patient_id,
        time_slot_id: slot.id,
        channel: BookingChannel::Staff,
        registered_at: now,
        state: BookingState::Confirmed,
        cancellation_reason: None,
        cancelled_at: None,
        updated_at: now,
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
    (booking, record)
}

/// Common time-of-day fixtures.
pub fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

/// Weekday check used by week-default listing tests: whether two dates fall
/// in the same Monday-started week.
pub fn same_week(a: NaiveDate, b: NaiveDate) -> bool {
    let monday_a = a - chrono::Duration::days(a.weekday().num_days_from_monday() as i64);
    let monday_b = b - chrono::Duration::days(b.weekday().num_days_from_monday() as i64);
    monday_a == monday_b
}
