//! Operational endpoints outside the public API.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::services::reminders::ScanReport;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/internal/reminders/scan", post(run_reminder_scan))
}

/// Run one reminder scan now. Returns `skipped = true` when a scan is
/// already in progress.
#[utoipa::path(
    post,
    path = "/internal/reminders/scan",
    tag = "Internal",
    responses((status = 200, description = "Scan report", body = ScanReport)),
)]
pub async fn run_reminder_scan(State(state): State<AppState>) -> Json<ScanReport> {
    Json(state.reminders.run_scan().await)
}
