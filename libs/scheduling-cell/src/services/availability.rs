use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::ClinicStore;
use shared_models::{Availability, ScheduleError, SlotState};

use crate::models::CreateAvailabilityRequest;

/// Registry of provider-declared working windows. Windows are immutable once
/// slots exist for them; the only mutation after that point is deactivation.
pub struct AvailabilityService {
    store: Arc<ClinicStore>,
}

impl AvailabilityService {
    pub fn new(store: Arc<ClinicStore>) -> Self {
        Self { store }
    }

    /// Declare a working window for a provider.
    pub async fn create(
        &self,
        request: CreateAvailabilityRequest,
    ) -> Result<Availability, ScheduleError> {
        debug!(
            "creating availability for provider {} on {}",
            request.provider_id, request.date
        );

        if request.start_time >= request.end_time {
            return Err(ScheduleError::Validation(
                "start time must be before end time".to_string(),
            ));
        }

        let now = Utc::now();
        self.store
            .transaction(move |tables| {
                tables.doctor(request.provider_id)?;

                let overlaps = tables.availabilities.values().any(|existing| {
                    existing.provider_id == request.provider_id
                        && existing.date == request.date
                        && existing.active
                        && request.start_time < existing.end_time
                        && existing.start_time < request.end_time
                });
                if overlaps {
                    return Err(ScheduleError::Validation(format!(
                        "provider {} already has an overlapping window on {}",
                        request.provider_id, request.date
                    )));
                }

                let availability = Availability {
                    id: Uuid::new_v4(),
                    provider_id: request.provider_id,
                    date: request.date,
                    start_time: request.start_time,
                    end_time: request.end_time,
                    active: true,
                    created_at: now,
                    updated_at: now,
                };
                tables
                    .availabilities
                    .insert(availability.id, availability.clone());
                Ok(availability)
            })
            .await
    }

    /// Deactivate a window and retire its future, still-unbooked slots.
    pub async fn deactivate(&self, availability_id: Uuid) -> Result<usize, ScheduleError> {
        let now = Utc::now();
        let retired = self
            .store
            .transaction(move |tables| {
                let availability = tables.availability_mut(availability_id)?;
                availability.active = false;
                availability.updated_at = now;

                let today = now.date_naive();
                let mut retired = 0;
                for slot in tables.slots.values_mut() {
                    if slot.availability_id == availability_id
                        && slot.state == SlotState::Available
                        && slot.date >= today
                    {
                        slot.state = SlotState::Blocked;
                        slot.updated_at = now;
                        retired += 1;
                    }
                }
                Ok(retired)
            })
            .await?;

        info!(
            "availability {} deactivated, {} future slots retired",
            availability_id, retired
        );
        Ok(retired)
    }

    /// List a provider's windows, most recent date first.
    pub async fn list_for_provider(&self, provider_id: Uuid) -> Vec<Availability> {
        self.store
            .read(|tables| {
                let mut windows: Vec<Availability> = tables
                    .availabilities
                    .values()
                    .filter(|a| a.provider_id == provider_id)
                    .cloned()
                    .collect();
                windows.sort_by_key(|a| (std::cmp::Reverse(a.date), a.start_time));
                windows
            })
            .await
    }
}
