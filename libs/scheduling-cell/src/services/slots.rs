use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::{ClinicStore, Tables};
use shared_models::{ScheduleError, SlotState, TimeSlot};

use crate::models::{ReleaseMode, SlotQuery};

/// Materializes bookable slots out of availability windows and answers
/// availability queries. Slot state only changes through the transactional
/// reserve/release operations below; slots are never deleted.
pub struct SlotService {
    store: Arc<ClinicStore>,
}

impl SlotService {
    pub fn new(store: Arc<ClinicStore>) -> Self {
        Self { store }
    }

    /// Materialize slots for a window and service, stepping by the service
    /// duration. Ranges already materialized are skipped, so regeneration is
    /// idempotent.
    pub async fn generate_slots(
        &self,
        availability_id: Uuid,
        service_id: Uuid,
    ) -> Result<Vec<TimeSlot>, ScheduleError> {
        let now = Utc::now();
        let created = self
            .store
            .transaction(move |tables| {
                let availability = tables.availability(availability_id)?.clone();
                if !availability.active {
                    return Err(ScheduleError::Validation(format!(
                        "availability {} is deactivated",
                        availability_id
                    )));
                }
                let service = tables.service(service_id)?.clone();
                let step = Duration::minutes(service.duration_minutes as i64);
                if step <= Duration::zero() {
                    return Err(ScheduleError::Validation(format!(
                        "service {} has a non-positive duration",
                        service_id
                    )));
                }

                let mut created = Vec::new();
                let mut cursor = availability.date.and_time(availability.start_time);
                let window_end = availability.date.and_time(availability.end_time);

                while cursor + step <= window_end {
                    let start = cursor.time();
                    let already_there = tables.slots.values().any(|slot| {
                        slot.availability_id == availability_id
                            && slot.date == availability.date
                            && slot.start_time == start
                    });
                    if !already_there {
                        let slot = TimeSlot {
                            id: Uuid::new_v4(),
                            provider_id: availability.provider_id,
                            date: availability.date,
                            start_time: start,
                            end_time: (cursor + step).time(),
                            service_id,
                            availability_id,
                            state: SlotState::Available,
                            created_at: now,
                            updated_at: now,
                        };
                        tables.slots.insert(slot.id, slot.clone());
                        created.push(slot);
                    }
                    cursor += step;
                }
                Ok(created)
            })
            .await?;

        info!(
            "generated {} slots for availability {}",
            created.len(),
            availability_id
        );
        Ok(created)
    }

    /// Available slots matching the filters, ordered by date and start time.
    /// With no date filter the listing covers the current calendar week.
    pub async fn list_available(&self, query: SlotQuery) -> Vec<TimeSlot> {
        let week = query.date.is_none().then(|| current_week(Utc::now().date_naive()));

        self.store
            .read(move |tables| {
                let mut slots: Vec<TimeSlot> = tables
                    .slots
                    .values()
                    .filter(|slot| slot.state == SlotState::Available)
                    .filter(|slot| query.date.map_or(true, |d| slot.date == d))
                    .filter(|slot| {
                        week.map_or(true, |(monday, sunday)| {
                            slot.date >= monday && slot.date <= sunday
                        })
                    })
                    .filter(|slot| query.provider_id.map_or(true, |p| slot.provider_id == p))
                    .filter(|slot| query.service_id.map_or(true, |s| slot.service_id == s))
                    .cloned()
                    .collect();
                slots.sort_by_key(|slot| (slot.date, slot.start_time));
                slots
            })
            .await
    }

    /// Reserve a slot: Available → Occupied, at most one winner under
    /// concurrent callers.
    pub async fn reserve(&self, slot_id: Uuid) -> Result<TimeSlot, ScheduleError> {
        let now = Utc::now();
        let slot = self
            .store
            .transaction(move |tables| reserve_in_tx(tables, slot_id, now))
            .await?;
        debug!("slot {} reserved", slot_id);
        Ok(slot)
    }

    /// Release an occupied slot, either reopening it (cancellation) or
    /// marking it superseded (reprogrammed away from).
    pub async fn release(&self, slot_id: Uuid, mode: ReleaseMode) -> Result<TimeSlot, ScheduleError> {
        let now = Utc::now();
        let slot = self
            .store
            .transaction(move |tables| release_in_tx(tables, slot_id, mode, now))
            .await?;
        debug!("slot {} released ({:?})", slot_id, mode);
        Ok(slot)
    }

    pub async fn get(&self, slot_id: Uuid) -> Result<TimeSlot, ScheduleError> {
        self.store
            .read(move |tables| tables.slot(slot_id).cloned())
            .await
    }
}

/// In-transaction reservation, shared with the booking and change-request
/// transactions so the slot flip commits or rolls back with them.
pub fn reserve_in_tx(
    tables: &mut Tables,
    slot_id: Uuid,
    now: DateTime<Utc>,
) -> Result<TimeSlot, ScheduleError> {
    let slot = tables.slot_mut(slot_id)?;
    if slot.state != SlotState::Available {
        return Err(ScheduleError::SlotUnavailable {
            slot_id,
            state: slot.state,
        });
    }
    slot.state = SlotState::Occupied;
    slot.updated_at = now;
    Ok(slot.clone())
}

/// In-transaction release: Occupied → Available or Occupied → Superseded.
pub fn release_in_tx(
    tables: &mut Tables,
    slot_id: Uuid,
    mode: ReleaseMode,
    now: DateTime<Utc>,
) -> Result<TimeSlot, ScheduleError> {
    let slot = tables.slot_mut(slot_id)?;
    if slot.state != SlotState::Occupied {
        return Err(ScheduleError::InvalidTransition {
            entity: shared_models::EntityKind::TimeSlot,
            from: slot.state.to_string(),
            to: match mode {
                ReleaseMode::Reopen => SlotState::Available.to_string(),
                ReleaseMode::Supersede => SlotState::Superseded.to_string(),
            },
        });
    }
    slot.state = match mode {
        ReleaseMode::Reopen => SlotState::Available,
        ReleaseMode::Supersede => SlotState::Superseded,
    };
    slot.updated_at = now;
    Ok(slot.clone())
}

/// Monday..Sunday bounds of the week containing `day`.
pub fn current_week(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = day - Duration::days(day.weekday().num_days_from_monday() as i64);
    (monday, monday + Duration::days(6))
}
