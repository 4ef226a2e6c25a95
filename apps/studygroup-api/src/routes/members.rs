//! Membership endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::group_member::GroupMember;
use crate::services::membership::{self, LeaveOutcome};
use crate::services::{groups, lifecycle};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/groups/{id}/members", get(list_members).post(join_group))
        .route("/groups/{id}/members/me", delete(leave_group))
        .route(
            "/groups/{id}/members/{user_id}/approve",
            post(approve_member),
        )
        .route("/groups/{id}/members/{user_id}/check-in", post(check_in_member))
        .route("/groups/{id}/members/{user_id}/no-show", post(mark_no_show))
}

#[derive(Debug, Deserialize)]
pub struct MemberPath {
    pub id: i64,
    pub user_id: i64,
}

// ---------------------------------------------------------------------------
// GET /api/v1/groups/{id}/members
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ListMembersResponse {
    pub data: Vec<GroupMember>,
}

#[utoipa::path(
    get,
    path = "/api/v1/groups/{id}/members",
    tag = "Members",
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Members ordered by join time", body = ListMembersResponse),
        (status = 404, description = "Not found", body = ApiErrorBody),
    ),
)]
pub async fn list_members(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ListMembersResponse>, ApiError> {
    let data = groups::list_members(&state, id).await?;
    Ok(Json(ListMembersResponse { data }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/groups/{id}/members
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/groups/{id}/members",
    tag = "Members",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 201, description = "Joined; seated, pending or waitlisted", body = GroupMember),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Already a member or wrong status", body = ApiErrorBody),
    ),
)]
pub async fn join_group(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<GroupMember>), ApiError> {
    let member = membership::join(&state, &caller, id).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/groups/{id}/members/me
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/api/v1/groups/{id}/members/me",
    tag = "Members",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Left the group", body = LeaveOutcome),
        (status = 404, description = "Not a member", body = ApiErrorBody),
        (status = 409, description = "Organizer cannot leave", body = ApiErrorBody),
    ),
)]
pub async fn leave_group(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LeaveOutcome>, ApiError> {
    Ok(Json(membership::leave(&state, &caller, id).await?))
}

// ---------------------------------------------------------------------------
// POST /api/v1/groups/{id}/members/{user_id}/approve | /check-in | /no-show
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/groups/{id}/members/{user_id}/approve",
    tag = "Members",
    security(("user_id" = [])),
    params(
        ("id" = i64, Path, description = "Group id"),
        ("user_id" = i64, Path, description = "Member's user id"),
    ),
    responses(
        (status = 200, description = "Member approved", body = GroupMember),
        (status = 403, description = "Not the organizer", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Group full or wrong status", body = ApiErrorBody),
    ),
)]
pub async fn approve_member(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<MemberPath>,
) -> Result<Json<GroupMember>, ApiError> {
    let member = membership::approve(&state, &caller, path.id, path.user_id).await?;
    Ok(Json(member))
}

#[utoipa::path(
    post,
    path = "/api/v1/groups/{id}/members/{user_id}/check-in",
    tag = "Lifecycle",
    security(("user_id" = [])),
    params(
        ("id" = i64, Path, description = "Group id"),
        ("user_id" = i64, Path, description = "Member's user id"),
    ),
    responses(
        (status = 200, description = "Member checked in", body = GroupMember),
        (status = 403, description = "Not the organizer", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Not eligible or wrong status", body = ApiErrorBody),
    ),
)]
pub async fn check_in_member(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<MemberPath>,
) -> Result<Json<GroupMember>, ApiError> {
    let member = lifecycle::check_in(&state, &caller, path.id, path.user_id).await?;
    Ok(Json(member))
}

#[utoipa::path(
    post,
    path = "/api/v1/groups/{id}/members/{user_id}/no-show",
    tag = "Lifecycle",
    security(("user_id" = [])),
    params(
        ("id" = i64, Path, description = "Group id"),
        ("user_id" = i64, Path, description = "Member's user id"),
    ),
    responses(
        (status = 200, description = "Member marked as no-show", body = GroupMember),
        (status = 403, description = "Not the organizer", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Member was checked in, or wrong status", body = ApiErrorBody),
    ),
)]
pub async fn mark_no_show(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<MemberPath>,
) -> Result<Json<GroupMember>, ApiError> {
    let member = lifecycle::mark_no_show(&state, &caller, path.id, path.user_id).await?;
    Ok(Json(member))
}
