use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::catalog::ServiceCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
    Exam,
    Operation,
}

impl ProcedureKind {
    /// Whether a slot for the given service category can redeem this kind.
    pub fn matches_category(&self, category: ServiceCategory) -> bool {
        matches!(
            (self, category),
            (ProcedureKind::Exam, ServiceCategory::Exam)
                | (ProcedureKind::Operation, ServiceCategory::Operation)
        )
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcedureKind::Exam => write!(f, "exam"),
            ProcedureKind::Operation => write!(f, "operation"),
        }
    }
}

/// Doctor-issued, time-bounded, single-use permission to book an exam or
/// operation. `used_at` and `generated_booking_id` are set together in the
/// consuming transaction and never change afterwards; expiry is derived from
/// `expires_at` at read time, never stored as a status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureAuthorization {
    pub id: Uuid,
    /// The appointment execution record this authorization was issued from.
    pub source_appointment_id: Uuid,
    pub patient_id: Uuid,
    pub authorizing_doctor_id: Uuid,
    pub procedure_kind: ProcedureKind,
    pub service_id: Uuid,
    pub required_specialty: Option<String>,
    pub assigned_doctor_id: Option<Uuid>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub generated_booking_id: Option<Uuid>,
}

impl ProcedureAuthorization {
    pub fn is_consumed(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Unused, unexpired: still redeemable for a booking.
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        !self.is_consumed() && !self.is_expired(now)
    }
}
