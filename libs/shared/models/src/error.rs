use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::scheduling::SlotState;

/// Which table a failed lookup or guard was referring to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Availability,
    TimeSlot,
    Booking,
    ExecutionRecord,
    ChangeRequest,
    Authorization,
    Doctor,
    Service,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Availability => write!(f, "availability"),
            EntityKind::TimeSlot => write!(f, "time_slot"),
            EntityKind::Booking => write!(f, "booking"),
            EntityKind::ExecutionRecord => write!(f, "execution_record"),
            EntityKind::ChangeRequest => write!(f, "change_request"),
            EntityKind::Authorization => write!(f, "authorization"),
            EntityKind::Doctor => write!(f, "doctor"),
            EntityKind::Service => write!(f, "service"),
        }
    }
}

/// Domain error taxonomy for the scheduling engine.
///
/// Every rejected operation carries the offending ids so the caller can render
/// an actionable message; nothing is silently swallowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ScheduleError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    #[error("time slot {slot_id} is not available (state: {state})")]
    SlotUnavailable { slot_id: Uuid, state: SlotState },

    #[error("authorization {authorization_id} has already been used")]
    AlreadyUsed { authorization_id: Uuid },

    #[error("authorization {authorization_id} expired at {expired_at}")]
    Expired {
        authorization_id: Uuid,
        expired_at: DateTime<Utc>,
    },

    #[error("doctor specialty {actual} does not match required specialty {required}")]
    SpecialtyMismatch { required: String, actual: String },

    #[error("no qualifying doctor assigned; must derive to a {required} specialist")]
    MustDeriveToSpecialist { required: String },

    #[error("booking {booking_id} already has {limit} approved reprogram requests")]
    LimitExceeded { booking_id: Uuid, limit: u32 },

    #[error("outcome for booking {booking_id} recorded outside the permitted window (ends {window_end})")]
    OutOfWindow {
        booking_id: Uuid,
        window_end: DateTime<Utc>,
    },

    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: EntityKind,
        from: String,
        to: String,
    },

    #[error("doctor {actor} is not the provider assigned to this booking")]
    Unauthorized { actor: Uuid },

    #[error("could not acquire the row lock within the configured wait")]
    Busy,

    #[error("validation error: {0}")]
    Validation(String),
}
