use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use shared_config::SchedulerConfig;
use shared_database::ClinicStore;
use shared_models::SlotState;

/// Closes slots whose date has passed while they were still Available. The
/// sweep is idempotent and throttled per instance, and runs under the short
/// lock wait so it never starves interactive bookings.
pub struct SlotSweepService {
    store: Arc<ClinicStore>,
    interval: std::time::Duration,
    lock_wait: std::time::Duration,
    last_run: Mutex<Option<Instant>>,
}

impl SlotSweepService {
    pub fn new(store: Arc<ClinicStore>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            interval: config.slot_sweep_interval(),
            lock_wait: config.sweep_lock_wait(),
            last_run: Mutex::new(None),
        }
    }

    /// Close expired slots. Returns the number closed; a throttled run
    /// returns 0 without touching the store. A `Busy` result just means the
    /// next scheduled run will pick the slots up.
    pub async fn close_expired(&self, now: DateTime<Utc>) -> Result<usize, shared_models::ScheduleError> {
        {
            let mut last_run = self.last_run.lock().await;
            if let Some(previous) = *last_run {
                if previous.elapsed() < self.interval {
                    debug!("slot expiry sweep throttled");
                    return Ok(0);
                }
            }
            *last_run = Some(Instant::now());
        }

        let today = now.date_naive();
        let closed = self
            .store
            .transaction_bounded(self.lock_wait, move |tables| {
                let mut closed = 0;
                for slot in tables.slots.values_mut() {
                    if slot.state == SlotState::Available && slot.date < today {
                        slot.state = SlotState::Occupied;
                        slot.updated_at = now;
                        closed += 1;
                    }
                }
                Ok(closed)
            })
            .await?;

        if closed > 0 {
            info!("slot expiry sweep closed {} past slots", closed);
        }
        Ok(closed)
    }
}
