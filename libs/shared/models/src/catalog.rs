use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Read-only provider registry entry. Catalog CRUD lives outside the engine;
/// the engine only reads specialties for matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub specialty: String,
}

/// What kind of execution record a booked slot produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Consultation,
    Exam,
    Operation,
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceCategory::Consultation => write!(f, "consultation"),
            ServiceCategory::Exam => write!(f, "exam"),
            ServiceCategory::Operation => write!(f, "operation"),
        }
    }
}

/// Read-only service registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicService {
    pub id: Uuid,
    pub name: String,
    pub category: ServiceCategory,
    /// Specialty a doctor must hold to perform this service, when restricted.
    pub required_specialty: Option<String>,
    pub duration_minutes: i32,
}
