//! Group endpoints: CRUD, lifecycle transitions and the announcement.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::group::{Group, GroupDetail};
use crate::services::groups::{self, CreateGroup, UpdateGroup};
use crate::services::lifecycle;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/groups", post(create_group))
        .route(
            "/groups/{id}",
            get(get_group).patch(update_group).delete(delete_group),
        )
        .route("/groups/{id}/start", post(start_group))
        .route("/groups/{id}/finish", post(finish_group))
        .route("/groups/{id}/cancel", post(cancel_group))
        .route("/groups/{id}/announcement", put(pin_announcement))
}

// ---------------------------------------------------------------------------
// POST /api/v1/groups
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/groups",
    tag = "Groups",
    security(("user_id" = [])),
    request_body = CreateGroup,
    responses(
        (status = 201, description = "Group created", body = GroupDetail),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn create_group(
    caller: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateGroup>,
) -> Result<(StatusCode, Json<GroupDetail>), ApiError> {
    let detail = groups::create_group(&state, &caller, &body).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

// ---------------------------------------------------------------------------
// GET /api/v1/groups/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/groups/{id}",
    tag = "Groups",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group with seat counts", body = GroupDetail),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<GroupDetail>, ApiError> {
    Ok(Json(groups::get_group(&state, id).await?))
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/groups/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    patch,
    path = "/api/v1/groups/{id}",
    tag = "Groups",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    request_body = UpdateGroup,
    responses(
        (status = 200, description = "Group updated", body = GroupDetail),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Not the organizer", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Group is no longer upcoming", body = ApiErrorBody),
    ),
)]
pub async fn update_group(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateGroup>,
) -> Result<Json<GroupDetail>, ApiError> {
    Ok(Json(groups::update_group(&state, &caller, id, &body).await?))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/groups/{id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/groups/{id}",
    tag = "Groups",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 403, description = "Not the organizer", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Group has started", body = ApiErrorBody),
    ),
)]
pub async fn delete_group(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    groups::delete_group(&state, &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /api/v1/groups/{id}/start | /finish | /cancel
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/groups/{id}/start",
    tag = "Lifecycle",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group is ongoing", body = Group),
        (status = 403, description = "Not the organizer", body = ApiErrorBody),
        (status = 409, description = "Wrong status", body = ApiErrorBody),
    ),
)]
pub async fn start_group(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Group>, ApiError> {
    Ok(Json(lifecycle::start(&state, &caller, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/groups/{id}/finish",
    tag = "Lifecycle",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group is completed", body = Group),
        (status = 403, description = "Not the organizer", body = ApiErrorBody),
        (status = 409, description = "Wrong status", body = ApiErrorBody),
    ),
)]
pub async fn finish_group(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Group>, ApiError> {
    Ok(Json(lifecycle::finish_group(&state, &caller, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/groups/{id}/cancel",
    tag = "Lifecycle",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group is cancelled", body = Group),
        (status = 403, description = "Not the organizer", body = ApiErrorBody),
        (status = 409, description = "Wrong status", body = ApiErrorBody),
    ),
)]
pub async fn cancel_group(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Group>, ApiError> {
    Ok(Json(lifecycle::cancel(&state, &caller, id).await?))
}

// ---------------------------------------------------------------------------
// PUT /api/v1/groups/{id}/announcement
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnnouncementRequest {
    /// New text; `null` clears the announcement.
    pub text: Option<String>,
}

#[utoipa::path(
    put,
    path = "/api/v1/groups/{id}/announcement",
    tag = "Groups",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    request_body = AnnouncementRequest,
    responses(
        (status = 200, description = "Announcement updated", body = Group),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Not the organizer", body = ApiErrorBody),
        (status = 409, description = "Wrong status", body = ApiErrorBody),
    ),
)]
pub async fn pin_announcement(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<AnnouncementRequest>,
) -> Result<Json<Group>, ApiError> {
    let group = groups::pin_announcement(&state, &caller, id, body.text.as_deref()).await?;
    Ok(Json(group))
}
