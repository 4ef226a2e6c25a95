//! Per-caller request throttle.
//!
//! Counts live behind [`Store::record_hit`](crate::db::Store::record_hit), so
//! every instance sharing a database shares the same sliding window.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::middleware::USER_ID_HEADER;
use crate::error::{ApiError, ErrorKind};
use crate::AppState;

/// Identity the window is keyed on: the resolved user when present,
/// otherwise the client address.
pub fn throttle_key(req: &Request<Body>) -> String {
    if let Some(user_id) = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
    {
        return format!("user:{user_id}");
    }

    let forwarded = req
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .map(|ip| ip.trim().to_string());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    format!(
        "ip:{}",
        forwarded.or(peer).unwrap_or_else(|| "unknown".to_string())
    )
}

pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = throttle_key(&req);
    let window = state.config.rate_limit_window();

    match state
        .store
        .record_hit(&key, state.clock.now(), window)
        .await
    {
        Ok(count) if count > state.config.rate_limit_requests => {
            tracing::debug!(%key, count, "rate limited");
            ApiError::new(
                ErrorKind::RateLimited,
                format!(
                    "Too many requests, try again in {} seconds",
                    window.as_secs()
                ),
            )
            .into_response()
        }
        Ok(_) => next.run(req).await,
        // Fail open.
        Err(err) => {
            tracing::warn!(%key, error = %err, "rate limit check failed");
            next.run(req).await
        }
    }
}
