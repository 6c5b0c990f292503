use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::BookingChannel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub channel: BookingChannel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: String,
    pub cancelled_by: CancelledBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    Staff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteBookingRequest {
    /// The acting provider; must be the slot's provider.
    pub provider_id: Uuid,
    /// Clinical outcome text recorded into the execution record.
    pub outcome: String,
    /// Staff override for recording an outcome outside the same-day window.
    pub override_window: bool,
}
