use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, MatchingState};
use crate::services::DoctorMatchingService;

pub fn create_matching_router(config: Arc<AppConfig>, service: Arc<DoctorMatchingService>) -> Router {
    let state = MatchingState { service };

    Router::new()
        .route("/specialties", get(handlers::list_specialties))
        .route("/doctors/search", get(handlers::search_doctors))
        .route("/doctors/me/pending", get(handlers::pending_requests))
        .route("/doctors/me/patients", get(handlers::doctor_patients))
        .route("/requests", post(handlers::request_doctor))
        .route("/requests/active", get(handlers::active_relationship))
        .route("/requests/history", get(handlers::request_history))
        .route("/requests/{request_id}/respond", post(handlers::respond_to_request))
        .route("/requests/{request_id}/cancel", post(handlers::cancel_request))
        .route("/watch", get(handlers::watch_relationships))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
