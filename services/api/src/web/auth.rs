//! services/api/src/web/auth.rs
//!
//! Authentication endpoints. Sign-in happens at the hosted auth provider, which
//! issues the `session` cookie; this service only ends sessions.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension,
};
use scripture_reader_core::ports::AuthEvent;
use std::sync::Arc;
use tracing::{error, info};

use crate::web::middleware::SessionCookie;
use crate::web::state::AppState;

const CLEARED_COOKIE: &str = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";

/// POST /auth/logout - Invalidate the session and sign out every open reader.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(SessionCookie(session_id)): Extension<SessionCookie>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session_id = session_id.ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .sessions
        .delete_auth_session(&session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
        })?;

    // Open readers for this cookie drop back to the anonymous view.
    state.auth_notifier.notify(&session_id, AuthEvent::SignedOut);
    info!("Auth session ended");

    Ok((StatusCode::OK, [(header::SET_COOKIE, CLEARED_COOKIE.to_string())]))
}
