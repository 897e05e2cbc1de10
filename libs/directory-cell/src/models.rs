use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;
use shared_models::error::AppError;

use crate::license::LicenseId;
use crate::services::specialty::normalize_specialty;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub display_name: String,
    pub license_id: LicenseId,
    #[serde(default, deserialize_with = "deserialize_specialties")]
    pub specialties: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl DoctorProfile {
    pub fn offers(&self, specialty: &str) -> bool {
        normalize_specialty(specialty)
            .map(|wanted| self.specialties.contains(&wanted))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: Uuid,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Stored rows carry the specialty field either as a single string or as a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum SpecialtyField {
    One(String),
    Many(Vec<String>),
    Missing(()),
}

fn deserialize_specialties<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match SpecialtyField::deserialize(deserializer)? {
        SpecialtyField::One(single) => vec![single],
        SpecialtyField::Many(list) => list,
        SpecialtyField::Missing(_) => Vec::new(),
    };

    Ok(raw.iter().filter_map(|s| normalize_specialty(s)).collect())
}

// ==============================================================================
// REGISTRATION FORMS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDoctorRequest {
    pub display_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub license_id: String,
    pub specialties: Vec<String>,
    /// Free-text specialty, required when the "other" option is selected.
    pub other_specialty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPatientRequest {
    pub display_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmendSpecialtiesRequest {
    pub specialties: Vec<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Directory storage error: {0}")]
    Storage(String),
}

impl From<DatabaseError> for DirectoryError {
    fn from(err: DatabaseError) -> Self {
        if err.is_transient() {
            return DirectoryError::Unavailable(err.to_string());
        }
        if err.is_conflict() {
            return DirectoryError::Conflict(err.to_string());
        }
        match err {
            DatabaseError::NotFound(what) => DirectoryError::NotFound(what),
            other => DirectoryError::Storage(other.to_string()),
        }
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        let message = err.to_string();
        match err {
            DirectoryError::NotFound(_) => AppError::NotFound(message),
            DirectoryError::Unavailable(_) => AppError::ServiceUnavailable(message),
            DirectoryError::Conflict(_) => AppError::Conflict(message),
            DirectoryError::Validation(_) => AppError::ValidationError(message),
            DirectoryError::Unauthorized(_) => AppError::Forbidden(message),
            DirectoryError::Storage(_) => AppError::Internal(message),
        }
    }
}
