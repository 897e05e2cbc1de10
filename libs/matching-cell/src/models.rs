use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use directory_cell::{DoctorProfile, PatientProfile};

// ==============================================================================
// CORE MATCH REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Cancelled,
    Rejected,
}

impl MatchStatus {
    /// Pending and Accepted requests form a patient's active relationship.
    pub fn is_active(&self) -> bool {
        matches!(self, MatchStatus::Pending | MatchStatus::Accepted)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Pending => write!(f, "pending"),
            MatchStatus::Accepted => write!(f, "accepted"),
            MatchStatus::Cancelled => write!(f, "cancelled"),
            MatchStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

/// Whose relationships a subscription follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Party {
    Patient(Uuid),
    Doctor(Uuid),
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Patient(id) => write!(f, "patient {}", id),
            Party::Doctor(id) => write!(f, "doctor {}", id),
        }
    }
}

/// One element of a relationship subscription.
///
/// For a patient, `requests` holds its active request, if any. For a doctor it holds
/// every Pending and Accepted request addressed to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    pub party: Party,
    /// Ledger commit sequence this snapshot reflects.
    pub sequence: u64,
    pub requests: Vec<MatchRequest>,
    pub observed_at: DateTime<Utc>,
}

impl RelationshipSnapshot {
    /// The patient's single active request.
    pub fn active(&self) -> Option<&MatchRequest> {
        self.requests.iter().find(|r| r.status.is_active())
    }

    pub fn accepted(&self) -> impl Iterator<Item = &MatchRequest> {
        self.requests.iter().filter(|r| r.status == MatchStatus::Accepted)
    }
}

// ==============================================================================
// JOINED VIEWS
// ==============================================================================

// A request stays visible when the other party's profile has left the directory;
// the profile is then `None`.

/// A patient's active request together with the doctor it targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRelationship {
    pub request: MatchRequest,
    pub doctor: Option<DoctorProfile>,
}

/// A request addressed to a doctor together with the requesting patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRequest {
    pub request: MatchRequest,
    pub patient: Option<PatientProfile>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDoctorRequest {
    pub doctor_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondToRequest {
    pub decision: Decision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSearchQuery {
    pub specialty: String,
    pub exclude_doctor_id: Option<Uuid>,
}
