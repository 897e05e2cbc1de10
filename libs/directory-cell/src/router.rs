use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, DirectoryState};

pub fn directory_routes(state: DirectoryState) -> Router {
    let public_routes = Router::new()
        .route("/specialties", get(handlers::list_specialties))
        .route("/specialties/suggested", get(handlers::suggested_specialties));

    let protected_routes = Router::new()
        .route("/doctors", post(handlers::register_doctor))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor))
        .route("/doctors/{doctor_id}/specialties", put(handlers::amend_specialties))
        .route("/patients", post(handlers::register_patient))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
