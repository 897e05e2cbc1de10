use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::license::LicenseId;
use crate::models::{
    DirectoryError, DoctorProfile, PatientProfile, RegisterDoctorRequest, RegisterPatientRequest,
};
use crate::services::specialty::{normalize_specialty, OTHER_SPECIALTY};
use crate::services::store::DirectoryBackend;

const MIN_PASSWORD_LENGTH: usize = 6;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern compiles")
    })
}

fn invalid(message: &str) -> DirectoryError {
    DirectoryError::Validation(message.to_string())
}

/// Validates sign-up forms and writes the resulting profiles. Account ids come from
/// the identity provider; credentials are checked here but never stored.
pub struct RegistrationService {
    directory: Arc<dyn DirectoryBackend>,
}

impl RegistrationService {
    pub fn new(directory: Arc<dyn DirectoryBackend>) -> Self {
        Self { directory }
    }

    pub async fn register_doctor(
        &self,
        account_id: Uuid,
        request: RegisterDoctorRequest,
    ) -> Result<DoctorProfile, DirectoryError> {
        debug!("Registering doctor account {}", account_id);

        let display_name = validate_account_fields(
            &request.display_name,
            &request.email,
            &request.password,
            &request.confirm_password,
        )?;
        let license_id = LicenseId::parse(&request.license_id)?;
        let specialties = resolve_specialties(&request.specialties, request.other_specialty.as_deref())?;

        if self.directory.crm_exists(&license_id).await? {
            warn!("Rejected registration with duplicate license {}", license_id);
            return Err(DirectoryError::Conflict(format!(
                "License {} is already registered",
                license_id
            )));
        }

        let doctor = self
            .directory
            .insert_doctor(DoctorProfile {
                id: account_id,
                display_name,
                license_id,
                specialties,
                created_at: Utc::now(),
            })
            .await?;

        info!("Doctor {} registered with license {}", doctor.id, doctor.license_id);
        Ok(doctor)
    }

    pub async fn register_patient(
        &self,
        account_id: Uuid,
        request: RegisterPatientRequest,
    ) -> Result<PatientProfile, DirectoryError> {
        debug!("Registering patient account {}", account_id);

        let display_name = validate_account_fields(
            &request.display_name,
            &request.email,
            &request.password,
            &request.confirm_password,
        )?;

        let patient = self
            .directory
            .insert_patient(PatientProfile {
                id: account_id,
                display_name,
                created_at: Utc::now(),
            })
            .await?;

        info!("Patient {} registered", patient.id);
        Ok(patient)
    }

    /// Replace a doctor's specialty set. Only the owning doctor may do this.
    pub async fn amend_specialties(
        &self,
        doctor_id: Uuid,
        acting_user_id: Uuid,
        specialties: &[String],
    ) -> Result<DoctorProfile, DirectoryError> {
        if doctor_id != acting_user_id {
            warn!("User {} tried to amend specialties of doctor {}", acting_user_id, doctor_id);
            return Err(DirectoryError::Unauthorized(
                "Only the doctor can change their own specialties".to_string(),
            ));
        }

        let specialties: BTreeSet<String> =
            specialties.iter().filter_map(|s| normalize_specialty(s)).collect();
        if specialties.is_empty() {
            return Err(invalid("Select at least one specialty"));
        }

        self.directory.get_doctor(doctor_id).await?;
        let doctor = self.directory.update_specialties(doctor_id, specialties).await?;

        info!("Doctor {} now offers {:?}", doctor.id, doctor.specialties);
        Ok(doctor)
    }
}

/// Checks shared by both sign-up forms; returns the trimmed display name.
fn validate_account_fields(
    display_name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<String, DirectoryError> {
    let display_name = display_name.trim();
    let email = email.trim();

    if display_name.is_empty() || email.is_empty() || password.is_empty() || confirm_password.is_empty() {
        return Err(invalid("Fill in all required fields"));
    }
    if display_name.split_whitespace().count() < 2 {
        return Err(invalid("Enter both first and last name"));
    }
    if email.len() > 254 || !email_pattern().is_match(email) {
        return Err(invalid("Invalid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(invalid("Password must have at least 6 characters"));
    }
    if password != confirm_password {
        return Err(invalid("Passwords do not match"));
    }

    Ok(display_name.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Turn the form selection into the stored specialty set. Selecting the "other"
/// option requires the free-text specialty, which takes its place.
fn resolve_specialties(
    selected: &[String],
    other: Option<&str>,
) -> Result<BTreeSet<String>, DirectoryError> {
    let other_key = normalize_specialty(OTHER_SPECIALTY);
    let mut specialties = BTreeSet::new();
    let mut wants_other = false;

    for raw in selected {
        match normalize_specialty(raw) {
            Some(specialty) if Some(&specialty) == other_key.as_ref() => wants_other = true,
            Some(specialty) => {
                specialties.insert(specialty);
            }
            None => {}
        }
    }

    if wants_other {
        let custom = other
            .and_then(normalize_specialty)
            .ok_or_else(|| invalid("Describe the other specialty"))?;
        specialties.insert(custom);
    }

    if specialties.is_empty() {
        return Err(invalid("Select at least one specialty"));
    }

    Ok(specialties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_account_field_rules() {
        assert_eq!(
            validate_account_fields("  Ana   Souza ", "ana@example.com", "secret1", "secret1").unwrap(),
            "Ana Souza"
        );
        assert_matches!(
            validate_account_fields("", "ana@example.com", "secret1", "secret1"),
            Err(DirectoryError::Validation(_))
        );
        assert_matches!(
            validate_account_fields("Ana", "ana@example.com", "secret1", "secret1"),
            Err(DirectoryError::Validation(msg)) if msg.contains("last name")
        );
        assert_matches!(
            validate_account_fields("Ana Souza", "ana@", "secret1", "secret1"),
            Err(DirectoryError::Validation(msg)) if msg.contains("email")
        );
        assert_matches!(
            validate_account_fields("Ana Souza", "ana@example.com", "short", "short"),
            Err(DirectoryError::Validation(msg)) if msg.contains("6 characters")
        );
        assert_matches!(
            validate_account_fields("Ana Souza", "ana@example.com", "secret1", "secret2"),
            Err(DirectoryError::Validation(msg)) if msg.contains("do not match")
        );
    }

    #[test]
    fn test_other_specialty_replaces_placeholder() {
        let resolved = resolve_specialties(
            &["Cardiologia".to_string(), "Outras".to_string()],
            Some("  geriatria "),
        )
        .unwrap();

        assert_eq!(
            resolved.into_iter().collect::<Vec<_>>(),
            vec!["Cardiologia".to_string(), "Geriatria".to_string()]
        );
    }

    #[test]
    fn test_other_specialty_requires_text() {
        assert_matches!(
            resolve_specialties(&["Outras".to_string()], Some("   ")),
            Err(DirectoryError::Validation(_))
        );
        assert_matches!(resolve_specialties(&[], None), Err(DirectoryError::Validation(_)));
    }
}
