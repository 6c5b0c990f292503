use std::env;
use std::time::Duration;

use tracing::warn;

/// Runtime configuration for the scheduling engine.
///
/// Every knob has a production default matching the clinic's operating rules;
/// environment variables override them for staging and load tests.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Lock-wait bound for interactive transactions, in milliseconds.
    pub lock_wait_ms: u64,
    /// Shorter lock-wait bound for background sweeps so they never starve
    /// interactive bookings.
    pub sweep_lock_wait_ms: u64,
    /// Minimum interval between slot-expiry sweep runs, in seconds.
    pub slot_sweep_interval_secs: u64,
    /// Calendar days a procedure authorization stays valid after issuance.
    pub authorization_validity_days: i64,
    /// Width of the reminder dispatch band, in minutes.
    pub reminder_band_minutes: i64,
    /// Look-ahead horizon for "authorization expiring soon" notices, in hours.
    pub expiry_notice_horizon_hours: i64,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            lock_wait_ms: env_u64("SCHEDULER_LOCK_WAIT_MS", 5_000),
            sweep_lock_wait_ms: env_u64("SCHEDULER_SWEEP_LOCK_WAIT_MS", 2_000),
            slot_sweep_interval_secs: env_u64("SCHEDULER_SLOT_SWEEP_INTERVAL_SECS", 300),
            authorization_validity_days: env_i64("SCHEDULER_AUTHORIZATION_VALIDITY_DAYS", 7),
            reminder_band_minutes: env_i64("SCHEDULER_REMINDER_BAND_MINUTES", 30),
            expiry_notice_horizon_hours: env_i64("SCHEDULER_EXPIRY_NOTICE_HORIZON_HOURS", 24),
        }
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn sweep_lock_wait(&self) -> Duration {
        Duration::from_millis(self.sweep_lock_wait_ms)
    }

    pub fn slot_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.slot_sweep_interval_secs)
    }

    pub fn authorization_validity(&self) -> chrono::Duration {
        chrono::Duration::days(self.authorization_validity_days)
    }

    pub fn reminder_band(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reminder_band_minutes)
    }

    pub fn expiry_notice_horizon(&self) -> chrono::Duration {
        chrono::Duration::hours(self.expiry_notice_horizon_hours)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lock_wait_ms: 5_000,
            sweep_lock_wait_ms: 2_000,
            slot_sweep_interval_secs: 300,
            authorization_validity_days: 7,
            reminder_band_minutes: 30,
            expiry_notice_horizon_hours: 24,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid integer ({}), using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid integer ({}), using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
