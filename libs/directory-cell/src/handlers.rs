use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{auth::User, error::AppError};
use shared_utils::extractor::account_id;

use crate::models::{AmendSpecialtiesRequest, DirectoryError, RegisterDoctorRequest, RegisterPatientRequest};
use crate::services::specialty::{OTHER_SPECIALTY, SUGGESTED_SPECIALTIES};
use crate::services::{DirectoryBackend, DirectoryStore, RegistrationService, SpecialtyIndex};

#[derive(Clone)]
pub struct DirectoryState {
    pub config: Arc<AppConfig>,
    pub directory: Arc<dyn DirectoryStore>,
    pub registration: Arc<RegistrationService>,
    pub specialties: Arc<SpecialtyIndex>,
}

impl DirectoryState {
    pub fn new<D>(config: Arc<AppConfig>, backend: Arc<D>) -> Self
    where
        D: DirectoryBackend + 'static,
    {
        let directory: Arc<dyn DirectoryStore> = backend.clone();
        Self {
            config,
            registration: Arc::new(RegistrationService::new(backend)),
            specialties: Arc::new(SpecialtyIndex::new(directory.clone())),
            directory,
        }
    }
}

pub async fn list_specialties(
    State(state): State<DirectoryState>,
) -> Result<Json<Value>, AppError> {
    let catalog = state.specialties.list_specialties().await;

    if let Some(reason) = catalog.unavailable {
        return Err(DirectoryError::Unavailable(reason).into());
    }

    Ok(Json(json!({
        "specialties": catalog.specialties,
        "total": catalog.specialties.len()
    })))
}

pub async fn suggested_specialties() -> Json<Value> {
    Json(json!({
        "specialties": SUGGESTED_SPECIALTIES,
        "other_option": OTHER_SPECIALTY
    }))
}

#[axum::debug_handler]
pub async fn register_doctor(
    State(state): State<DirectoryState>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let account = account_id(&user)?;
    info!("Doctor registration for account {}", account);

    let doctor = state.registration.register_doctor(account, request).await?;
    Ok((StatusCode::CREATED, Json(json!(doctor))))
}

#[axum::debug_handler]
pub async fn register_patient(
    State(state): State<DirectoryState>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterPatientRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let account = account_id(&user)?;
    info!("Patient registration for account {}", account);

    let patient = state.registration.register_patient(account, request).await?;
    Ok((StatusCode::CREATED, Json(json!(patient))))
}

pub async fn get_doctor(
    State(state): State<DirectoryState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = state.directory.get_doctor(doctor_id).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn amend_specialties(
    State(state): State<DirectoryState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<AmendSpecialtiesRequest>,
) -> Result<Json<Value>, AppError> {
    let acting = account_id(&user)?;

    let doctor = state
        .registration
        .amend_specialties(doctor_id, acting, &request.specialties)
        .await?;
    Ok(Json(json!(doctor)))
}
