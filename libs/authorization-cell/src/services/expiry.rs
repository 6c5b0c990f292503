use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use notification_cell::{emit, NotificationCategory, NotificationEvent, NotificationSink};
use shared_config::SchedulerConfig;
use shared_database::ClinicStore;
use shared_models::ScheduleError;

/// Expiry reporting and expiring-soon notices. Expiry itself is derived from
/// `expires_at` wherever an authorization is read; nothing here mutates an
/// authorization row.
pub struct AuthorizationExpiryService {
    store: Arc<ClinicStore>,
    sink: Arc<dyn NotificationSink>,
    horizon: chrono::Duration,
}

impl AuthorizationExpiryService {
    pub fn new(
        store: Arc<ClinicStore>,
        sink: Arc<dyn NotificationSink>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            sink,
            horizon: config.expiry_notice_horizon(),
        }
    }

    /// Count unused authorizations that have lapsed. Read-only; feeds the
    /// staff reporting view.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let count = self
            .store
            .read(move |tables| {
                tables
                    .authorizations
                    .values()
                    .filter(|a| !a.is_consumed() && a.is_expired(now))
                    .count()
            })
            .await;

        if count > 0 {
            info!("{} unused authorizations have expired", count);
        }
        count
    }

    /// Notify patients whose unused authorizations lapse within the horizon.
    /// The notice ledger keeps this idempotent across sweep runs.
    pub async fn notify_expiring_soon(&self, now: DateTime<Utc>) -> Result<usize, ScheduleError> {
        let horizon = self.horizon;
        let due = self
            .store
            .transaction(move |tables| {
                let mut due: Vec<(Uuid, Uuid, DateTime<Utc>)> = tables
                    .authorizations
                    .values()
                    .filter(|a| a.is_pending(now) && a.expires_at <= now + horizon)
                    .map(|a| (a.id, a.patient_id, a.expires_at))
                    .collect();
                due.retain(|(id, _, _)| tables.expiry_notice_log.insert(*id));
                Ok(due)
            })
            .await?;

        for (authorization_id, patient_id, expires_at) in &due {
            emit(
                self.sink.as_ref(),
                NotificationEvent::for_patient(
                    *patient_id,
                    NotificationCategory::AuthorizationExpiringSoon,
                    "Autorización por vencer",
                    format!("Su procedimiento autorizado vence el {}.", expires_at),
                )
                .about_authorization(*authorization_id),
            )
            .await;
        }

        if !due.is_empty() {
            info!("dispatched {} authorization expiry notices", due.len());
        }
        Ok(due.len())
    }
}
