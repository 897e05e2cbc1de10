use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::license::LicenseId;
use crate::models::{DirectoryError, DoctorProfile, PatientProfile};
use crate::services::store::{DirectoryStore, DirectoryWriter};

const DOCTORS: &str = "/rest/v1/doctors";
const PATIENTS: &str = "/rest/v1/patients";

/// Directory backed by the hosted document store's REST interface.
pub struct SupabaseDirectory {
    supabase: SupabaseClient,
    service_token: String,
}

impl SupabaseDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            service_token: config.supabase_anon_key.clone(),
        }
    }

    async fn fetch_values(&self, path: &str) -> Result<Vec<Value>, DirectoryError> {
        Ok(self
            .supabase
            .request(Method::GET, path, Some(&self.service_token), None)
            .await?)
    }

    /// Single-row reads are strict: a row that does not decode is a storage fault.
    async fn fetch_one<T: DeserializeOwned>(&self, path: &str, what: String) -> Result<T, DirectoryError> {
        let row = self
            .fetch_values(path)
            .await?
            .into_iter()
            .next()
            .ok_or(DirectoryError::NotFound(what))?;

        serde_json::from_value(row).map_err(|e| {
            error!("Malformed directory row at {}: {}", path, e);
            DirectoryError::Storage(format!("Malformed directory row: {}", e))
        })
    }

    /// List reads skip rows that do not decode, so one legacy row cannot hide the rest.
    async fn fetch_decodable<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, DirectoryError> {
        let rows = self.fetch_values(path).await?;
        let total = rows.len();

        let decoded: Vec<T> = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.get("id").cloned().unwrap_or(Value::Null);
                match serde_json::from_value(row) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!("Skipping malformed directory row {} at {}: {}", id, path, e);
                        None
                    }
                }
            })
            .collect();

        if decoded.len() < total {
            warn!("{} of {} rows at {} could not be decoded", total - decoded.len(), total, path);
        }
        Ok(decoded)
    }

    async fn write_one<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Value,
        what: String,
    ) -> Result<T, DirectoryError> {
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                method,
                path,
                Some(&self.service_token),
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        let row = rows.into_iter().next().ok_or(DirectoryError::NotFound(what))?;
        serde_json::from_value(row)
            .map_err(|e| DirectoryError::Storage(format!("Malformed directory row: {}", e)))
    }
}

#[async_trait]
impl DirectoryStore for SupabaseDirectory {
    async fn get_doctor(&self, id: Uuid) -> Result<DoctorProfile, DirectoryError> {
        debug!("Fetching doctor profile: {}", id);
        self.fetch_one(&format!("{}?id=eq.{}", DOCTORS, id), format!("Doctor {}", id))
            .await
    }

    async fn list_doctors(&self) -> Result<Vec<DoctorProfile>, DirectoryError> {
        debug!("Listing all doctor profiles");
        self.fetch_decodable(&format!("{}?select=*&order=display_name.asc", DOCTORS))
            .await
    }

    async fn get_patient(&self, id: Uuid) -> Result<PatientProfile, DirectoryError> {
        debug!("Fetching patient profile: {}", id);
        self.fetch_one(&format!("{}?id=eq.{}", PATIENTS, id), format!("Patient {}", id))
            .await
    }

    async fn crm_exists(&self, license_id: &LicenseId) -> Result<bool, DirectoryError> {
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!("{}?license_id=eq.{}&select=id", DOCTORS, license_id),
                Some(&self.service_token),
                None,
            )
            .await?;

        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl DirectoryWriter for SupabaseDirectory {
    async fn insert_doctor(&self, doctor: DoctorProfile) -> Result<DoctorProfile, DirectoryError> {
        let body = serde_json::to_value(&doctor)
            .map_err(|e| DirectoryError::Storage(e.to_string()))?;

        self.write_one(Method::POST, DOCTORS, body, format!("Doctor {}", doctor.id))
            .await
            .map_err(|e| match e {
                DirectoryError::Conflict(_) => DirectoryError::Conflict(format!(
                    "License {} is already registered",
                    doctor.license_id
                )),
                other => other,
            })
    }

    async fn insert_patient(&self, patient: PatientProfile) -> Result<PatientProfile, DirectoryError> {
        let body = serde_json::to_value(&patient)
            .map_err(|e| DirectoryError::Storage(e.to_string()))?;

        self.write_one(Method::POST, PATIENTS, body, format!("Patient {}", patient.id))
            .await
    }

    async fn update_specialties(
        &self,
        doctor_id: Uuid,
        specialties: BTreeSet<String>,
    ) -> Result<DoctorProfile, DirectoryError> {
        self.write_one(
            Method::PATCH,
            &format!("{}?id=eq.{}", DOCTORS, doctor_id),
            json!({ "specialties": specialties }),
            format!("Doctor {}", doctor_id),
        )
        .await
    }
}
