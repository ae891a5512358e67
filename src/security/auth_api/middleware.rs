use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use log::{debug, error, warn};
use tower_cookies::Cookies;

use super::types::SessionContext;
use crate::core::session::{find_active_session, SESSION_COOKIE};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;

/// Resolve the session cookie into a [`SessionContext`] request extension.
///
/// Resolution happens at most once per request: a context that is already
/// present is left untouched. Expired sessions, banned users and lookup
/// failures all resolve as anonymous.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.extensions().get::<SessionContext>().is_none() {
        let context = match cookies.get(SESSION_COOKIE) {
            Some(cookie) if !cookie.value().is_empty() => {
                resolve_session(&state, cookie.value().to_string()).await
            }
            _ => SessionContext::anonymous(),
        };
        request.extensions_mut().insert(context);
    }

    next.run(request).await
}

async fn resolve_session(state: &AppState, token: String) -> SessionContext {
    let found = with_conn(&state.conn, move |conn| find_active_session(conn, &token)).await;

    match found {
        Ok(Some((session, user))) => {
            if user.is_banned_at(Utc::now()) {
                warn!("Ignoring session {} of banned user {}", session.id, user.id);
                return SessionContext::anonymous();
            }
            debug!("Resolved session {} for user {}", session.id, user.id);
            SessionContext::signed_in(session, user)
        }
        Ok(None) => SessionContext::anonymous(),
        Err(e) => {
            error!("Failed to resolve session: {}", e);
            SessionContext::anonymous()
        }
    }
}
