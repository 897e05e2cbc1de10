use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use shared_models::{auth::User, error::AppError};
use shared_utils::extractor::account_id;

use crate::models::{DoctorSearchQuery, Party, RequestDoctorRequest, RespondToRequest};
use crate::services::DoctorMatchingService;

#[derive(Clone)]
pub struct MatchingState {
    pub service: Arc<DoctorMatchingService>,
}

fn party_of(user: &User) -> Result<Party, AppError> {
    let id = account_id(user)?;
    Ok(if user.is_doctor() {
        Party::Doctor(id)
    } else {
        Party::Patient(id)
    })
}

fn require_doctor(user: &User) -> Result<Uuid, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Forbidden("Only doctors can access this resource".to_string()));
    }
    account_id(user)
}

pub async fn list_specialties(
    State(state): State<MatchingState>,
) -> Result<Json<Value>, AppError> {
    let specialties = state.service.list_specialties().await?;

    Ok(Json(json!({
        "specialties": specialties,
        "total": specialties.len()
    })))
}

/// Patients get their accepted doctor hidden automatically; an explicit
/// `exclude_doctor_id` takes precedence.
pub async fn search_doctors(
    State(state): State<MatchingState>,
    Extension(user): Extension<User>,
    Query(query): Query<DoctorSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let doctors = match (query.exclude_doctor_id, party_of(&user)?) {
        (None, Party::Patient(patient_id)) => {
            state
                .service
                .search_doctors_for_patient(patient_id, &query.specialty)
                .await?
        }
        (exclude, _) => state.service.search_doctors(&query.specialty, exclude).await?,
    };

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn request_doctor(
    State(state): State<MatchingState>,
    Extension(user): Extension<User>,
    Json(body): Json<RequestDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let patient_id = account_id(&user)?;
    info!("Patient {} requesting doctor {}", patient_id, body.doctor_id);

    let request = state.service.request_doctor(patient_id, body.doctor_id).await?;
    Ok((StatusCode::CREATED, Json(json!(request))))
}

pub async fn active_relationship(
    State(state): State<MatchingState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let patient_id = account_id(&user)?;
    let relationship = state.service.active_relationship(patient_id).await?;

    Ok(Json(json!({ "relationship": relationship })))
}

pub async fn request_history(
    State(state): State<MatchingState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let patient_id = account_id(&user)?;
    let requests = state.service.history(patient_id).await?;

    Ok(Json(json!({
        "requests": requests,
        "total": requests.len()
    })))
}

#[axum::debug_handler]
pub async fn respond_to_request(
    State(state): State<MatchingState>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<RespondToRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = account_id(&user)?;

    let request = state
        .service
        .respond_to_request(request_id, doctor_id, body.decision)
        .await?;
    Ok(Json(json!(request)))
}

pub async fn cancel_request(
    State(state): State<MatchingState>,
    Extension(user): Extension<User>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = account_id(&user)?;

    let request = state.service.cancel_request(request_id, user_id).await?;
    Ok(Json(json!(request)))
}

pub async fn pending_requests(
    State(state): State<MatchingState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = require_doctor(&user)?;
    let requests = state.service.pending_requests(doctor_id).await?;

    Ok(Json(json!({
        "requests": requests,
        "total": requests.len()
    })))
}

pub async fn doctor_patients(
    State(state): State<MatchingState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = require_doctor(&user)?;
    let patients = state.service.doctor_patients(doctor_id).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

/// Server-sent events, one `snapshot` event per relationship snapshot. The
/// subscription is released when the client disconnects; the event stream ends when
/// the server drops a lagging subscription, and the client is expected to reconnect.
pub async fn watch_relationships(
    State(state): State<MatchingState>,
    Extension(user): Extension<User>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let party = party_of(&user)?;
    let snapshots = state.service.watch_active_relationship(party).await?;

    let events = snapshots.filter_map(|snapshot| async move {
        match Event::default()
            .event("snapshot")
            .id(snapshot.sequence.to_string())
            .json_data(&snapshot)
        {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                warn!("Dropping unserializable snapshot {}: {}", snapshot.sequence, err);
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
