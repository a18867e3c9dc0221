use crate::error::ApiError;
use crate::models::requests::SessionRequest;
use crate::models::responses::{SessionInfo, SessionResponse};
use crate::routes::ValidJson;
use crate::services::session::Session;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::Json, Extension};
use chrono::Utc;
use tracing::info;

pub async fn open_session(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<SessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let (token, session) = state
        .sessions
        .open(&request.user, &request.access_key, Utc::now())?;
    info!("Opened session for {} until {}", session.user, session.expires_at);

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user: session.user,
            expires_at: session.expires_at,
        }),
    ))
}

pub async fn current_session(Extension(session): Extension<Session>) -> Json<SessionInfo> {
    Json(SessionInfo {
        user: session.user,
        expires_at: session.expires_at,
    })
}
