use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::Redirect;
use serde::Serialize;
use tracing::warn;

use crate::report::{self, ENTRY_FILE};
use crate::run::record::RunRecord;
use crate::run::types::{ComparisonOutcome, ComparisonRequest, FeedbackStatus, RunId, RunState, RunSummary, Viewport};
use crate::run::workspace::HTML_REPORT_DIR;

use super::errors::AppError;
use super::{AppState, DATA_PREFIX};

// --- Response types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResponse {
    pub message: String,
    pub report_id: RunId,
    pub report_url: String,
    pub state: RunState,
    pub viewport: Viewport,
    pub outcome: ComparisonOutcome,
    pub feedback_attached: bool,
    pub feedback: FeedbackStatus,
    pub report_augmented: bool,
}

impl From<RunSummary> for CompareResponse {
    fn from(summary: RunSummary) -> Self {
        let message = match (&summary.outcome, &summary.feedback) {
            (_, FeedbackStatus::Attached { .. }) => "Comparison complete with feedback",
            (_, FeedbackStatus::ProviderFailed { .. }) => "Comparison complete, but feedback failed",
            (_, FeedbackStatus::ArtifactMissing { .. }) => {
                "Comparison complete, capture image not found for feedback"
            }
            (ComparisonOutcome::DifferencesFound, _) => "Comparison complete with differences",
            (ComparisonOutcome::NoDifferences, _) => "Comparison complete",
        };
        Self {
            message: message.to_string(),
            report_id: summary.run_id,
            report_url: format!("/reports/{}", summary.run_id),
            state: summary.state,
            viewport: summary.viewport,
            outcome: summary.outcome,
            feedback_attached: summary.feedback_attached(),
            feedback: summary.feedback,
            report_augmented: summary.report_augmented,
        }
    }
}

#[derive(Serialize)]
pub struct ViewportInfo {
    pub key: &'static str,
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// --- Handlers ---

/// POST /compare
pub async fn compare(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ComparisonRequest>,
) -> Result<Json<CompareResponse>, AppError> {
    let summary = state.orchestrator.run_comparison(req).await?;
    Ok(Json(summary.into()))
}

/// GET /reports/:id
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Redirect, AppError> {
    report::fetch_report(&state.data_dir, &id).await?;
    Ok(Redirect::to(&format!(
        "{}/{}/{}/{}",
        DATA_PREFIX, HTML_REPORT_DIR, id, ENTRY_FILE
    )))
}

/// GET /reports/:id/run
pub async fn get_run_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunRecord>, AppError> {
    let run_id = RunId::parse(&id).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let record = state
        .orchestrator
        .records()
        .load(&run_id)
        .await
        .map_err(|e| {
            warn!(run_id = %run_id, error = %format!("{:#}", e), "Run record lookup failed");
            AppError::NotFound(format!("Run '{}' not found", id))
        })?;
    Ok(Json(record))
}

/// GET /viewports
pub async fn list_viewports() -> Json<Vec<ViewportInfo>> {
    Json(
        Viewport::ALL
            .into_iter()
            .map(|v| {
                let (width, height) = v.dimensions();
                ViewportInfo {
                    key: v.label(),
                    width,
                    height,
                }
            })
            .collect(),
    )
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
