//! Peer feedback and reputation endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::feedback::{GivenRating, UserFeedback};
use crate::models::user::Reputation;
use crate::services::reputation::{self, FeedbackInput};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/groups/{id}/feedback", post(submit_feedback))
        .route("/groups/{id}/feedback/mine", get(my_feedback))
        .route("/users/{id}/reputation", get(get_reputation))
}

#[utoipa::path(
    post,
    path = "/api/v1/groups/{id}/feedback",
    tag = "Feedback",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    request_body = FeedbackInput,
    responses(
        (status = 201, description = "Feedback recorded", body = UserFeedback),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 404, description = "Group not found", body = ApiErrorBody),
        (status = 409, description = "Feedback not accepted", body = ApiErrorBody),
    ),
)]
pub async fn submit_feedback(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<FeedbackInput>,
) -> Result<(StatusCode, Json<UserFeedback>), ApiError> {
    let feedback = reputation::submit_feedback(&state, &caller, id, &body).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MyFeedbackResponse {
    pub data: Vec<GivenRating>,
}

#[utoipa::path(
    get,
    path = "/api/v1/groups/{id}/feedback/mine",
    tag = "Feedback",
    security(("user_id" = [])),
    params(("id" = i64, Path, description = "Group id")),
    responses(
        (status = 200, description = "Ratings the caller already gave", body = MyFeedbackResponse),
        (status = 404, description = "Group not found", body = ApiErrorBody),
    ),
)]
pub async fn my_feedback(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MyFeedbackResponse>, ApiError> {
    let data = reputation::get_my_feedback_for_group(&state, &caller, id).await?;
    Ok(Json(MyFeedbackResponse { data }))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/reputation",
    tag = "Feedback",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Smoothed reputation", body = Reputation),
        (status = 404, description = "Unknown user", body = ApiErrorBody),
    ),
)]
pub async fn get_reputation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Reputation>, ApiError> {
    Ok(Json(reputation::get_reputation(&state, id).await?))
}
