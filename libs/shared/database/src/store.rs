use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use shared_models::{
    Availability, Booking, BookingState, ChangeRequest, ChangeRequestKind, ChangeRequestState,
    ClinicService, Doctor, EntityKind, ExecutionRecord, ProcedureAuthorization, ReminderKind,
    ScheduleError, TimeSlot,
};

/// Every table the engine owns, behind one transaction boundary.
///
/// Row access goes through the typed accessors below so a missing row always
/// surfaces as `NotFound` with the entity kind and id attached.
#[derive(Debug, Default, Clone)]
pub struct Tables {
    pub doctors: HashMap<Uuid, Doctor>,
    pub services: HashMap<Uuid, ClinicService>,
    pub availabilities: HashMap<Uuid, Availability>,
    pub slots: HashMap<Uuid, TimeSlot>,
    pub bookings: HashMap<Uuid, Booking>,
    pub execution_records: HashMap<Uuid, ExecutionRecord>,
    pub change_requests: HashMap<Uuid, ChangeRequest>,
    pub authorizations: HashMap<Uuid, ProcedureAuthorization>,
    /// (booking, kind) pairs for reminders already dispatched.
    pub reminder_log: HashSet<(Uuid, ReminderKind)>,
    /// Authorizations whose expiring-soon notice was already dispatched.
    pub expiry_notice_log: HashSet<Uuid>,
}

impl Tables {
    pub fn doctor(&self, id: Uuid) -> Result<&Doctor, ScheduleError> {
        self.doctors.get(&id).ok_or(ScheduleError::NotFound {
            entity: EntityKind::Doctor,
            id,
        })
    }

    pub fn service(&self, id: Uuid) -> Result<&ClinicService, ScheduleError> {
        self.services.get(&id).ok_or(ScheduleError::NotFound {
            entity: EntityKind::Service,
            id,
        })
    }

    pub fn availability(&self, id: Uuid) -> Result<&Availability, ScheduleError> {
        self.availabilities.get(&id).ok_or(ScheduleError::NotFound {
            entity: EntityKind::Availability,
            id,
        })
    }

    pub fn availability_mut(&mut self, id: Uuid) -> Result<&mut Availability, ScheduleError> {
        self.availabilities
            .get_mut(&id)
            .ok_or(ScheduleError::NotFound {
                entity: EntityKind::Availability,
                id,
            })
    }

    pub fn slot(&self, id: Uuid) -> Result<&TimeSlot, ScheduleError> {
        self.slots.get(&id).ok_or(ScheduleError::NotFound {
            entity: EntityKind::TimeSlot,
            id,
        })
    }

    pub fn slot_mut(&mut self, id: Uuid) -> Result<&mut TimeSlot, ScheduleError> {
        self.slots.get_mut(&id).ok_or(ScheduleError::NotFound {
            entity: EntityKind::TimeSlot,
            id,
        })
    }

    pub fn booking(&self, id: Uuid) -> Result<&Booking, ScheduleError> {
        self.bookings.get(&id).ok_or(ScheduleError::NotFound {
            entity: EntityKind::Booking,
            id,
        })
    }

    pub fn booking_mut(&mut self, id: Uuid) -> Result<&mut Booking, ScheduleError> {
        self.bookings.get_mut(&id).ok_or(ScheduleError::NotFound {
            entity: EntityKind::Booking,
            id,
        })
    }

    pub fn execution_record(&self, id: Uuid) -> Result<&ExecutionRecord, ScheduleError> {
        self.execution_records
            .get(&id)
            .ok_or(ScheduleError::NotFound {
                entity: EntityKind::ExecutionRecord,
                id,
            })
    }

    pub fn execution_record_mut(&mut self, id: Uuid) -> Result<&mut ExecutionRecord, ScheduleError> {
        self.execution_records
            .get_mut(&id)
            .ok_or(ScheduleError::NotFound {
                entity: EntityKind::ExecutionRecord,
                id,
            })
    }

    pub fn change_request(&self, id: Uuid) -> Result<&ChangeRequest, ScheduleError> {
        self.change_requests
            .get(&id)
            .ok_or(ScheduleError::NotFound {
                entity: EntityKind::ChangeRequest,
                id,
            })
    }

    pub fn change_request_mut(&mut self, id: Uuid) -> Result<&mut ChangeRequest, ScheduleError> {
        self.change_requests
            .get_mut(&id)
            .ok_or(ScheduleError::NotFound {
                entity: EntityKind::ChangeRequest,
                id,
            })
    }

    pub fn authorization(&self, id: Uuid) -> Result<&ProcedureAuthorization, ScheduleError> {
        self.authorizations.get(&id).ok_or(ScheduleError::NotFound {
            entity: EntityKind::Authorization,
            id,
        })
    }

    pub fn authorization_mut(
        &mut self,
        id: Uuid,
    ) -> Result<&mut ProcedureAuthorization, ScheduleError> {
        self.authorizations
            .get_mut(&id)
            .ok_or(ScheduleError::NotFound {
                entity: EntityKind::Authorization,
                id,
            })
    }

    /// The execution record attached to a booking, if one exists.
    pub fn execution_for_booking(&self, booking_id: Uuid) -> Option<&ExecutionRecord> {
        self.execution_records
            .values()
            .find(|record| record.booking_id == booking_id)
    }

    pub fn execution_for_booking_mut(&mut self, booking_id: Uuid) -> Option<&mut ExecutionRecord> {
        self.execution_records
            .values_mut()
            .find(|record| record.booking_id == booking_id)
    }

    /// The booking currently holding a slot, ignoring cancelled ones.
    pub fn active_booking_for_slot(&self, slot_id: Uuid) -> Option<&Booking> {
        self.bookings
            .values()
            .find(|b| b.time_slot_id == slot_id && b.state != BookingState::Cancelled)
    }

    /// How many reprogram requests have already been approved for a booking.
    pub fn approved_reprogram_count(&self, booking_id: Uuid) -> usize {
        self.change_requests
            .values()
            .filter(|r| {
                r.booking_id == booking_id
                    && r.kind == ChangeRequestKind::Reprogram
                    && r.state == ChangeRequestState::Approved
            })
            .count()
    }
}

/// The injected persistence boundary: ACID transactions over the engine's
/// tables with a bounded lock wait.
///
/// `transaction` takes the exclusive lock (the row-locking read of the
/// relational deployment collapses to this single writer section), runs the
/// closure against a staged copy, and installs the copy only on success, so a
/// failing operation leaves no partial writes. Callers that cannot wait the
/// full interactive bound (the sweeps) pass their own shorter wait.
pub struct ClinicStore {
    tables: RwLock<Tables>,
    lock_wait: Duration,
}

impl ClinicStore {
    pub fn new(lock_wait: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            lock_wait,
        }
    }

    /// Run a mutating closure as one all-or-nothing transaction.
    pub async fn transaction<T, F>(&self, op: F) -> Result<T, ScheduleError>
    where
        F: FnOnce(&mut Tables) -> Result<T, ScheduleError>,
    {
        self.transaction_bounded(self.lock_wait, op).await
    }

    /// `transaction` with an explicit lock-wait bound.
    pub async fn transaction_bounded<T, F>(
        &self,
        lock_wait: Duration,
        op: F,
    ) -> Result<T, ScheduleError>
    where
        F: FnOnce(&mut Tables) -> Result<T, ScheduleError>,
    {
        let mut guard = timeout(lock_wait, self.tables.write())
            .await
            .map_err(|_| ScheduleError::Busy)?;

        let mut staged = guard.clone();
        match op(&mut staged) {
            Ok(value) => {
                *guard = staged;
                Ok(value)
            }
            Err(err) => {
                debug!("transaction rolled back: {}", err);
                Err(err)
            }
        }
    }

    /// Run a read-only closure under the shared lock. Listing calls go through
    /// here; they never stage and never block writers out.
    pub async fn read<T, F>(&self, op: F) -> T
    where
        F: FnOnce(&Tables) -> T,
    {
        let guard = self.tables.read().await;
        op(&guard)
    }

    /// Seed a registry doctor. Registry CRUD lives outside the engine; this is
    /// the staff-tooling entry point.
    pub async fn register_doctor(&self, doctor: Doctor) -> Result<(), ScheduleError> {
        self.transaction(|tables| {
            tables.doctors.insert(doctor.id, doctor);
            Ok(())
        })
        .await
    }

    /// Seed a registry service.
    pub async fn register_service(&self, service: ClinicService) -> Result<(), ScheduleError> {
        self.transaction(|tables| {
            tables.services.insert(service.id, service);
            Ok(())
        })
        .await
    }
}
