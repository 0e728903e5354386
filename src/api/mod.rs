mod errors;
pub mod handlers;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::run::RunOrchestrator;
use crate::settings::Settings;

pub use errors::{AppError, ErrorResponse};

/// Path prefix under which the data directory is served.
pub const DATA_PREFIX: &str = "/data";

/// Shared application state accessible by all handlers.
pub struct AppState {
    pub orchestrator: Arc<RunOrchestrator>,
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn new(orchestrator: Arc<RunOrchestrator>) -> Self {
        let data_dir = orchestrator.settings().data_dir.clone();
        Self {
            orchestrator,
            data_dir,
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>, max_body: usize) -> Router {
    let static_files = ServeDir::new(&state.data_dir);

    Router::new()
        .route("/compare", post(handlers::compare))
        .route("/reports/{id}", get(handlers::get_report))
        .route("/reports/{id}/run", get(handlers::get_run_record))
        .route("/viewports", get(handlers::list_viewports))
        .route("/health", get(handlers::health))
        .nest_service(DATA_PREFIX, static_files)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the REST API server.
pub async fn serve(host: &str, port: u16, settings: Arc<Settings>, max_body: usize) -> Result<()> {
    let orchestrator = Arc::new(RunOrchestrator::from_settings(settings));
    let state = Arc::new(AppState::new(orchestrator));
    let app = router(state, max_body);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("uicompare API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
