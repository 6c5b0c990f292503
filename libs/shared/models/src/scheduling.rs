use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A provider-declared working window. Immutable once slots exist for it,
/// except for deactivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Available,
    Occupied,
    Blocked,
    Superseded,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Available => write!(f, "available"),
            SlotState::Occupied => write!(f, "occupied"),
            SlotState::Blocked => write!(f, "blocked"),
            SlotState::Superseded => write!(f, "superseded"),
        }
    }
}

/// A discrete bookable unit derived from an Availability and a Service.
/// Never deleted; historical slots stay on record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Uuid,
    /// Carried from the owning availability so availability queries don't join.
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub service_id: Uuid,
    pub availability_id: Uuid,
    pub state: SlotState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeSlot {
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.start_time).and_utc()
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.end_time).and_utc()
    }
}
