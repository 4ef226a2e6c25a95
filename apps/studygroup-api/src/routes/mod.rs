pub mod feedback;
pub mod groups;
pub mod health;
pub mod internal;
pub mod members;
pub mod notifications;

use axum::Router;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::middleware::USER_ID_HEADER;
use crate::throttle;
use crate::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(internal::router())
        .nest(
            "/api/v1",
            groups::router()
                .merge(members::router())
                .merge(feedback::router())
                .merge(notifications::router())
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    throttle::rate_limit,
                )),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ID_HEADER))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Groups
        groups::create_group,
        groups::get_group,
        groups::update_group,
        groups::delete_group,
        groups::pin_announcement,
        // Lifecycle
        groups::start_group,
        groups::finish_group,
        groups::cancel_group,
        members::check_in_member,
        members::mark_no_show,
        // Members
        members::list_members,
        members::join_group,
        members::leave_group,
        members::approve_member,
        // Feedback
        feedback::submit_feedback,
        feedback::my_feedback,
        feedback::get_reputation,
        // Notifications
        notifications::stream_notifications,
        // Internal
        internal::run_reminder_scan,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::group::Group,
            crate::models::group::GroupDetail,
            crate::models::group::GroupStatus,
            crate::models::group::JoinPolicy,
            crate::models::group_member::GroupMember,
            crate::models::group_member::MemberRole,
            crate::models::group_member::MemberStatus,
            crate::models::feedback::UserFeedback,
            crate::models::feedback::FeedbackDimensions,
            crate::models::feedback::GivenRating,
            crate::models::user::Reputation,
            crate::notify::Notification,
            crate::notify::NotificationKind,
            // Request/response types
            health::HealthResponse,
            crate::services::groups::CreateGroup,
            crate::services::groups::UpdateGroup,
            groups::AnnouncementRequest,
            members::ListMembersResponse,
            crate::services::membership::LeaveOutcome,
            crate::services::reputation::FeedbackInput,
            feedback::MyFeedbackResponse,
            crate::services::reminders::ScanReport,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Groups", description = "Study group management"),
        (name = "Lifecycle", description = "Status transitions and attendance"),
        (name = "Members", description = "Membership and waitlist"),
        (name = "Feedback", description = "Peer feedback and reputation"),
        (name = "Notifications", description = "Real-time notifications"),
        (name = "Internal", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;
