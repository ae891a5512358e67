use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts, response::Redirect};

use super::error::AuthError;
use crate::core::shared::models::{Session, User};
use crate::core::urls::HubUrls;

/// The signed-in browser session and its owner.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session: Session,
    pub user: User,
}

impl CurrentSession {
    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }
}

/// Session state resolved once per request by
/// [`session_middleware`](super::middleware::session_middleware).
#[derive(Debug, Clone, Default)]
pub struct SessionContext(pub Option<Arc<CurrentSession>>);

impl SessionContext {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn signed_in(session: Session, user: User) -> Self {
        Self(Some(Arc::new(CurrentSession { session, user })))
    }

    pub fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(|current| current.is_admin())
    }

    pub fn current(&self) -> Option<&CurrentSession> {
        self.0.as_deref()
    }

    pub fn require(&self) -> Result<&CurrentSession, AuthError> {
        self.current().ok_or(AuthError::MissingSession)
    }

    pub fn require_admin(&self) -> Result<&CurrentSession, AuthError> {
        let current = self.require()?;
        if !current.is_admin() {
            return Err(AuthError::AdminRequired);
        }
        Ok(current)
    }

    /// Page guard: anonymous visitors are sent to the login flow.
    pub fn require_page(&self) -> Result<&CurrentSession, Redirect> {
        self.current().ok_or_else(|| Redirect::to(HubUrls::LOGIN))
    }

    /// Admin page guard: signed-in non-admins go back to the dashboard.
    pub fn require_admin_page(&self) -> Result<&CurrentSession, Redirect> {
        let current = self.require_page()?;
        if !current.is_admin() {
            return Err(Redirect::to(HubUrls::DASHBOARD));
        }
        Ok(current)
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .unwrap_or_default())
    }
}
