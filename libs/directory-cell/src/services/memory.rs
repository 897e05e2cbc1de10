use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::license::LicenseId;
use crate::models::{DirectoryError, DoctorProfile, PatientProfile};
use crate::services::store::{DirectoryStore, DirectoryWriter};

#[derive(Default)]
struct Profiles {
    doctors: HashMap<Uuid, DoctorProfile>,
    patients: HashMap<Uuid, PatientProfile>,
}

/// Process-local directory used for development and tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    profiles: RwLock<Profiles>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn doctor_count(&self) -> usize {
        self.profiles.read().await.doctors.len()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn get_doctor(&self, id: Uuid) -> Result<DoctorProfile, DirectoryError> {
        self.profiles
            .read()
            .await
            .doctors
            .get(&id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("Doctor {}", id)))
    }

    async fn list_doctors(&self) -> Result<Vec<DoctorProfile>, DirectoryError> {
        let profiles = self.profiles.read().await;
        let mut doctors: Vec<DoctorProfile> = profiles.doctors.values().cloned().collect();
        doctors.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        Ok(doctors)
    }

    async fn get_patient(&self, id: Uuid) -> Result<PatientProfile, DirectoryError> {
        self.profiles
            .read()
            .await
            .patients
            .get(&id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("Patient {}", id)))
    }

    async fn crm_exists(&self, license_id: &LicenseId) -> Result<bool, DirectoryError> {
        Ok(self
            .profiles
            .read()
            .await
            .doctors
            .values()
            .any(|doctor| &doctor.license_id == license_id))
    }
}

#[async_trait]
impl DirectoryWriter for InMemoryDirectory {
    async fn insert_doctor(&self, doctor: DoctorProfile) -> Result<DoctorProfile, DirectoryError> {
        let mut profiles = self.profiles.write().await;

        // License uniqueness is re-checked under the write lock.
        if profiles.doctors.values().any(|d| d.license_id == doctor.license_id) {
            return Err(DirectoryError::Conflict(format!(
                "License {} is already registered",
                doctor.license_id
            )));
        }
        if profiles.doctors.contains_key(&doctor.id) {
            return Err(DirectoryError::Conflict(format!("Doctor {} already exists", doctor.id)));
        }

        debug!("Registering doctor {} ({})", doctor.id, doctor.license_id);
        profiles.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn insert_patient(&self, patient: PatientProfile) -> Result<PatientProfile, DirectoryError> {
        let mut profiles = self.profiles.write().await;

        if profiles.patients.contains_key(&patient.id) {
            return Err(DirectoryError::Conflict(format!("Patient {} already exists", patient.id)));
        }

        debug!("Registering patient {}", patient.id);
        profiles.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn update_specialties(
        &self,
        doctor_id: Uuid,
        specialties: BTreeSet<String>,
    ) -> Result<DoctorProfile, DirectoryError> {
        let mut profiles = self.profiles.write().await;
        let doctor = profiles
            .doctors
            .get_mut(&doctor_id)
            .ok_or_else(|| DirectoryError::NotFound(format!("Doctor {}", doctor_id)))?;

        doctor.specialties = specialties;
        Ok(doctor.clone())
    }
}
