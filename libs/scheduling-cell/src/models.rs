use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Filters for the available-slot listing. With no date the query covers the
/// current calendar week, which is what the weekly agenda view consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotQuery {
    pub date: Option<NaiveDate>,
    pub provider_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
}

/// What a released slot becomes: reopened for booking (cancellation) or
/// superseded (reprogrammed away from).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMode {
    Reopen,
    Supersede,
}
