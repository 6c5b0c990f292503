use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{ProcedureAuthorization, ProcedureKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueAuthorizationRequest {
    /// The appointment execution record the procedure is derived from.
    pub appointment_id: Uuid,
    /// The issuing doctor.
    pub doctor_id: Uuid,
    pub procedure_kind: ProcedureKind,
    pub service_id: Uuid,
    /// Overrides the service's required specialty when set.
    pub required_specialty: Option<String>,
    /// Explicit assignee; subject to the specialty guard.
    pub assigned_doctor_id: Option<Uuid>,
}

/// A patient's redeemable authorizations, grouped the way the booking screens
/// gate on them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingAuthorizations {
    pub exams: Vec<ProcedureAuthorization>,
    pub operations: Vec<ProcedureAuthorization>,
}

impl PendingAuthorizations {
    pub fn is_empty(&self) -> bool {
        self.exams.is_empty() && self.operations.is_empty()
    }
}
