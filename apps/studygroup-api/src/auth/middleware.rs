//! Caller identity extraction.
//!
//! Authentication happens upstream; the gateway forwards the resolved user
//! in trusted headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            email: None,
        }
    }

    pub fn with_email(user_id: i64, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: Some(email.into()),
        }
    }
}

/// Rejection returned when the identity header is missing or malformed.
pub struct AuthError {
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": self.message
            }
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError {
                message: "Missing x-user-id header",
            })?;

        let user_id = raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or(AuthError {
                message: "Invalid x-user-id header",
            })?;

        let email = parts
            .headers
            .get(USER_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .and_then(|e| match e.parse::<lettre::Address>() {
                Ok(_) => Some(e.to_string()),
                Err(err) => {
                    tracing::debug!(
                        user_id,
                        error = %err,
                        "ignoring malformed x-user-email"
                    );
                    None
                }
            });

        Ok(AuthUser { user_id, email })
    }
}
