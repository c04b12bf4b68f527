//! services/api/src/web/middleware.rs
//!
//! Session cookie middleware. Reading scripture needs no sign-in, so nothing
//! here rejects a request; it only resolves who is asking.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use scripture_reader_core::domain::User;
use scripture_reader_core::ports::PortError;
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::state::AppState;

/// Name of the cookie carrying the auth session id.
pub const SESSION_COOKIE: &str = "session";

/// The raw session id from the request cookie, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionCookie(pub Option<String>);

/// Pulls the session id out of a `Cookie` header.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

/// Middleware that validates the auth session cookie when present.
///
/// Inserts the `SessionCookie` and an `Option<User>` into request extensions.
/// A missing, unknown or expired session just yields `None`.
pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let session_id = session_id_from_headers(req.headers());

    let user: Option<User> = match &session_id {
        Some(id) => match state.sessions.validate_auth_session(id).await {
            Ok(user) => Some(user),
            Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
                debug!("Ignoring unknown or expired session cookie");
                None
            }
            Err(e) => {
                error!("Failed to validate auth session: {:?}", e);
                None
            }
        },
        None => None,
    };

    req.extensions_mut().insert(SessionCookie(session_id));
    req.extensions_mut().insert(user);
    next.run(req).await
}
