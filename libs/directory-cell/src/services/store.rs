use std::collections::BTreeSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::license::LicenseId;
use crate::models::{DirectoryError, DoctorProfile, PatientProfile};

/// Read-only view of the profile directory consumed by the matching workflow.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn get_doctor(&self, id: Uuid) -> Result<DoctorProfile, DirectoryError>;

    /// Full scan; the number of registered doctors is assumed bounded.
    async fn list_doctors(&self) -> Result<Vec<DoctorProfile>, DirectoryError>;

    async fn get_patient(&self, id: Uuid) -> Result<PatientProfile, DirectoryError>;

    async fn crm_exists(&self, license_id: &LicenseId) -> Result<bool, DirectoryError>;
}

/// Write side used by registration. Records arrive already validated.
#[async_trait]
pub trait DirectoryWriter: Send + Sync {
    async fn insert_doctor(&self, doctor: DoctorProfile) -> Result<DoctorProfile, DirectoryError>;

    async fn insert_patient(&self, patient: PatientProfile) -> Result<PatientProfile, DirectoryError>;

    async fn update_specialties(
        &self,
        doctor_id: Uuid,
        specialties: BTreeSet<String>,
    ) -> Result<DoctorProfile, DirectoryError>;
}

/// A directory that can be both read and written.
pub trait DirectoryBackend: DirectoryStore + DirectoryWriter {}

impl<T: DirectoryStore + DirectoryWriter> DirectoryBackend for T {}
