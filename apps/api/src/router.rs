use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use directory_cell::handlers::DirectoryState;
use directory_cell::router::directory_routes;
use directory_cell::DirectoryBackend;
use matching_cell::{create_matching_router, DoctorMatchingService, MatchLedger, RetryPolicy};
use shared_config::AppConfig;

/// Both cells read the same directory; the ledger lives for the whole process.
pub fn create_router<D>(config: Arc<AppConfig>, directory: Arc<D>, ledger: Arc<MatchLedger>) -> Router
where
    D: DirectoryBackend + 'static,
{
    let matching = Arc::new(DoctorMatchingService::new(
        directory.clone(),
        ledger,
        RetryPolicy::from_config(&config),
    ));

    Router::new()
        .route("/", get(|| async { "Telehealth matching API is running!" }))
        .nest("/directory", directory_routes(DirectoryState::new(config.clone(), directory)))
        .nest("/matching", create_matching_router(config, matching))
}
