use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Structured API error returned to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Every failure an operation can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    WrongStatus,
    GroupFull,
    AlreadyMember,
    OrganizerCannotLeave,
    DuplicateFeedback,
    SelfRating,
    NotEligible,
    CannotMarkCheckedIn,
    RateLimited,
    /// Transient infrastructure failure; safe to retry the whole operation.
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::WrongStatus => "WRONG_STATUS",
            ErrorKind::GroupFull => "GROUP_FULL",
            ErrorKind::AlreadyMember => "ALREADY_MEMBER",
            ErrorKind::OrganizerCannotLeave => "ORGANIZER_CANNOT_LEAVE",
            ErrorKind::DuplicateFeedback => "DUPLICATE_FEEDBACK",
            ErrorKind::SelfRating => "SELF_RATING",
            ErrorKind::NotEligible => "NOT_ELIGIBLE",
            ErrorKind::CannotMarkCheckedIn => "CANNOT_MARK_CHECKED_IN",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::WrongStatus
            | ErrorKind::GroupFull
            | ErrorKind::AlreadyMember
            | ErrorKind::OrganizerCannotLeave
            | ErrorKind::DuplicateFeedback
            | ErrorKind::SelfRating
            | ErrorKind::NotEligible
            | ErrorKind::CannotMarkCheckedIn => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn wrong_status(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WrongStatus, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn validation(details: Vec<FieldError>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: "Validation failed".to_string(),
            details: Some(details),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Unavailable
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.kind.code().to_string(),
                message: self.message,
                details: self.details,
            },
        };
        (self.kind.status(), Json(body)).into_response()
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(DatabaseErrorKind::SerializationFailure, _)
            | Error::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
            | Error::BrokenTransactionManager => {
                tracing::warn!(?err, "transient database error");
                Self::unavailable("The service is temporarily unavailable")
            }
            _ => {
                tracing::error!(?err, "database error");
                Self::internal("An internal error occurred")
            }
        }
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for ApiError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        tracing::warn!(?err, "pool error");
        Self::unavailable("The service is temporarily unavailable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_conflicts_map_to_409() {
        for kind in [
            ErrorKind::GroupFull,
            ErrorKind::AlreadyMember,
            ErrorKind::DuplicateFeedback,
            ErrorKind::CannotMarkCheckedIn,
        ] {
            assert_eq!(kind.status(), StatusCode::CONFLICT);
        }
        assert_eq!(ErrorKind::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn serialization_failure_is_transient() {
        let err = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::SerializationFailure,
            Box::new("could not serialize access".to_string()),
        );
        assert!(ApiError::from(err).is_transient());
        assert!(!ApiError::from(diesel::result::Error::NotFound).is_transient());
    }

    #[test]
    fn validation_carries_field_details() {
        let err = ApiError::validation(vec![FieldError::new("title", "Title is required")]);
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.details.unwrap()[0].field, "title");
    }
}
