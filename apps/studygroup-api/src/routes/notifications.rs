//! Server-sent stream of the caller's notifications.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;

use crate::auth::middleware::AuthUser;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/notifications/stream", get(stream_notifications))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/stream",
    tag = "Notifications",
    security(("user_id" = [])),
    responses(
        (
            status = 200,
            description = "Event stream of notifications",
            content_type = "text/event-stream",
            body = crate::notify::Notification
        ),
    ),
)]
pub async fn stream_notifications(
    AuthUser { user_id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.fanout.subscribe();
    tracing::debug!(user_id, "notification stream opened");

    let events = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(delivery) if delivery.user_id == user_id => {
                    let event = Event::default()
                        .event("notification")
                        .json_data(&delivery.notification)
                        .unwrap_or_else(|_| Event::default().comment("unencodable notification"));
                    return Some((Ok(event), rx));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id, skipped, "notification stream lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
