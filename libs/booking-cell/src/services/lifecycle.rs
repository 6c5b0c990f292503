use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use shared_models::{BookingState, EntityKind, ScheduleError};

/// Central guard for booking state transitions. Every mutation of a booking's
/// state goes through `validate_transition`; no call site checks states
/// inline.
pub struct BookingLifecycleService;

impl BookingLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_transition(
        &self,
        current: &BookingState,
        next: &BookingState,
    ) -> Result<(), ScheduleError> {
        debug!("validating booking transition {} -> {}", current, next);

        if !self.valid_transitions(current).contains(next) {
            warn!("invalid booking transition attempted: {} -> {}", current, next);
            return Err(ScheduleError::InvalidTransition {
                entity: EntityKind::Booking,
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        Ok(())
    }

    pub fn valid_transitions(&self, current: &BookingState) -> Vec<BookingState> {
        match current {
            BookingState::Pending => vec![BookingState::Confirmed, BookingState::Cancelled],
            BookingState::Confirmed => vec![
                BookingState::Completed,
                BookingState::Cancelled,
                BookingState::NoShow,
            ],
            // Terminal states admit nothing.
            BookingState::Completed | BookingState::Cancelled | BookingState::NoShow => vec![],
        }
    }
}

impl Default for BookingLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

/// End of the same-day outcome window: 23:59:59 of the slot's date.
pub fn outcome_window_end(slot_date: NaiveDate) -> DateTime<Utc> {
    slot_date
        .and_hms_opt(23, 59, 59)
        .expect("23:59:59 is always a valid time")
        .and_utc()
}

/// Whether an outcome recorded at `at` falls inside the permitted window
/// `[slot start, end of the slot's date]`.
pub fn within_outcome_window(
    slot_start: DateTime<Utc>,
    slot_date: NaiveDate,
    at: DateTime<Utc>,
) -> bool {
    at >= slot_start && at <= outcome_window_end(slot_date)
}
