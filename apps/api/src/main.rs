use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use directory_cell::{InMemoryDirectory, SupabaseDirectory};
use matching_cell::{MatchLedger, SupabaseMatchStore};
use shared_config::{AppConfig, DirectoryBackend};

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting telehealth matching API server");

    let config = Arc::new(AppConfig::from_env());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = match config.directory_backend {
        DirectoryBackend::Supabase => {
            info!("Using Supabase directory and match store at {}", config.supabase_url);
            router::create_router(
                config.clone(),
                Arc::new(SupabaseDirectory::new(&config)),
                Arc::new(MatchLedger::new(Arc::new(SupabaseMatchStore::new(&config)))),
            )
        }
        DirectoryBackend::Memory => {
            info!("Using in-memory directory and match store");
            router::create_router(
                config.clone(),
                Arc::new(InMemoryDirectory::new()),
                Arc::new(MatchLedger::in_memory()),
            )
        }
    };

    let app = app
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
