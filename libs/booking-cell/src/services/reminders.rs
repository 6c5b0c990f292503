use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use notification_cell::{emit, NotificationCategory, NotificationEvent, NotificationSink};
use shared_config::SchedulerConfig;
use shared_database::ClinicStore;
use shared_models::{BookingState, ReminderKind, ScheduleError};

/// Whether a reminder of the given kind is due for a slot starting at
/// `slot_start`. The 24h reminder fires once the lead time drops under 24
/// hours (within one band of the mark); the 2h reminder fires inside a ±band
/// window around two hours before start.
pub fn reminder_due(
    kind: ReminderKind,
    slot_start: DateTime<Utc>,
    now: DateTime<Utc>,
    band: Duration,
) -> bool {
    let lead = slot_start - now;
    match kind {
        ReminderKind::Hours24 => lead <= Duration::hours(24) && lead > Duration::hours(24) - band,
        ReminderKind::Hours2 => {
            lead <= Duration::hours(2) + band && lead >= Duration::hours(2) - band
        }
    }
}

/// Periodic reminder dispatch for confirmed bookings. The ledger in the store
/// records what was already sent, so each booking gets each reminder at most
/// once no matter how often the sweep runs.
pub struct ReminderService {
    store: Arc<ClinicStore>,
    sink: Arc<dyn NotificationSink>,
    band: Duration,
}

impl ReminderService {
    pub fn new(
        store: Arc<ClinicStore>,
        sink: Arc<dyn NotificationSink>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            sink,
            band: config.reminder_band(),
        }
    }

    /// Dispatch all reminders currently due. Returns how many were emitted.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<usize, ScheduleError> {
        let band = self.band;
        let due = self
            .store
            .transaction(move |tables| {
                let mut due: Vec<(Uuid, Uuid, ReminderKind, DateTime<Utc>)> = Vec::new();
                for booking in tables.bookings.values() {
                    if booking.state != BookingState::Confirmed {
                        continue;
                    }
                    let Some(slot) = tables.slots.get(&booking.time_slot_id) else {
                        continue;
                    };
                    let start = slot.starts_at();
                    for kind in [ReminderKind::Hours24, ReminderKind::Hours2] {
                        if reminder_due(kind, start, now, band) {
                            due.push((booking.id, booking.patient_id, kind, start));
                        }
                    }
                }

                due.retain(|(booking_id, _, kind, _)| {
                    tables.reminder_log.insert((*booking_id, *kind))
                });
                Ok(due)
            })
            .await?;

        for (booking_id, patient_id, kind, start) in &due {
            let (category, title) = match kind {
                ReminderKind::Hours24 => {
                    (NotificationCategory::Reminder24h, "Recordatorio: cita mañana")
                }
                ReminderKind::Hours2 => {
                    (NotificationCategory::Reminder2h, "Recordatorio: cita próxima")
                }
            };
            emit(
                self.sink.as_ref(),
                NotificationEvent::for_patient(
                    *patient_id,
                    category,
                    title,
                    format!("Su cita está programada para {}.", start),
                )
                .about_booking(*booking_id),
            )
            .await;
        }

        if !due.is_empty() {
            info!("dispatched {} booking reminders", due.len());
        }
        Ok(due.len())
    }
}
