use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::warn;

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Rejects requests without a valid session and hands the verified
/// [`Session`](crate::services::session::Session) to handlers through the
/// request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    let session = state.sessions.verify(token, Utc::now()).map_err(|e| {
        warn!("Rejected session for {} {}: {}", request.method(), request.uri(), e);
        e
    })?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}
