use std::sync::Arc;

use chrono::Utc;
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authorization_cell::services::expiry::AuthorizationExpiryService;
use booking_cell::services::booking::BookingService;
use booking_cell::services::reminders::ReminderService;
use notification_cell::{LoggingSink, NotificationSink};
use scheduling_cell::services::sweep::SlotSweepService;
use shared_config::SchedulerConfig;
use shared_database::ClinicStore;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling engine");

    let config = SchedulerConfig::from_env();
    let store = Arc::new(ClinicStore::new(config.lock_wait()));
    let sink: Arc<dyn NotificationSink> = Arc::new(LoggingSink);

    let slot_sweep = SlotSweepService::new(Arc::clone(&store), &config);
    let bookings = BookingService::new(Arc::clone(&store), Arc::clone(&sink));
    let reminders = ReminderService::new(Arc::clone(&store), Arc::clone(&sink), &config);
    let expiry = AuthorizationExpiryService::new(Arc::clone(&store), Arc::clone(&sink), &config);

    let mut ticker = tokio::time::interval(config.slot_sweep_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                if let Err(err) = slot_sweep.close_expired(now).await {
                    warn!("slot expiry sweep skipped: {}", err);
                }
                if let Err(err) = bookings.mark_no_shows(now).await {
                    warn!("no-show sweep skipped: {}", err);
                }
                if let Err(err) = reminders.dispatch_due(now).await {
                    warn!("reminder dispatch skipped: {}", err);
                }
                if let Err(err) = expiry.notify_expiring_soon(now).await {
                    warn!("expiry notices skipped: {}", err);
                }
                let expired = expiry.sweep_expired(now).await;
                if expired > 0 {
                    info!("{} authorizations pending cleanup review", expired);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down clinic scheduling engine");
                break;
            }
        }
    }
}
