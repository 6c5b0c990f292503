use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for BookingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingState::Pending => write!(f, "pending"),
            BookingState::Confirmed => write!(f, "confirmed"),
            BookingState::Completed => write!(f, "completed"),
            BookingState::Cancelled => write!(f, "cancelled"),
            BookingState::NoShow => write!(f, "no_show"),
        }
    }
}

/// Entry point through which the booking was made. Recorded for reporting;
/// both channels start Confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingChannel {
    Staff,
    SelfService,
}

/// A patient's reservation of exactly one time slot. Never physically deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub time_slot_id: Uuid,
    pub channel: BookingChannel,
    pub registered_at: DateTime<Utc>,
    pub state: BookingState,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Pending => write!(f, "pending"),
            ExecutionState::Confirmed => write!(f, "confirmed"),
            ExecutionState::Completed => write!(f, "completed"),
            ExecutionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Type-specific payload of an execution record, chosen from the booked
/// slot's service category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionDetail {
    Appointment {
        diagnosis: Option<String>,
        follow_up_notes: Option<String>,
    },
    Exam {
        results: Option<String>,
        performed_by: Option<Uuid>,
    },
    Operation {
        surgical_notes: Option<String>,
        outcome: Option<String>,
    },
}

impl ExecutionDetail {
    /// Whether a clinical outcome has been recorded in the primary field.
    pub fn has_outcome(&self) -> bool {
        match self {
            ExecutionDetail::Appointment { diagnosis, .. } => diagnosis.is_some(),
            ExecutionDetail::Exam { results, .. } => results.is_some(),
            ExecutionDetail::Operation { outcome, .. } => outcome.is_some(),
        }
    }

    /// Write an outcome into the variant's primary field.
    pub fn record_outcome(&mut self, text: String) {
        match self {
            ExecutionDetail::Appointment { diagnosis, .. } => *diagnosis = Some(text),
            ExecutionDetail::Exam { results, .. } => *results = Some(text),
            ExecutionDetail::Operation { outcome, .. } => *outcome = Some(text),
        }
    }
}

/// One-to-one companion of a confirmed booking: the consultation, exam or
/// operation record the provider fills in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub state: ExecutionState,
    pub detail: ExecutionDetail,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRequestKind {
    Reprogram,
    Cancel,
}

impl fmt::Display for ChangeRequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeRequestKind::Reprogram => write!(f, "reprogram"),
            ChangeRequestKind::Cancel => write!(f, "cancel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRequestState {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ChangeRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeRequestState::Pending => write!(f, "pending"),
            ChangeRequestState::Approved => write!(f, "approved"),
            ChangeRequestState::Rejected => write!(f, "rejected"),
        }
    }
}

/// A staff-mediated request to reprogram or cancel a booking. Immutable once
/// resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub kind: ChangeRequestKind,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
    pub state: ChangeRequestState,
    /// Target slot for reprogram requests.
    pub target_time_slot_id: Option<Uuid>,
    pub resolution: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Reminder categories tracked in the dispatch ledger so each booking gets
/// each reminder at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Hours24,
    Hours2,
}
