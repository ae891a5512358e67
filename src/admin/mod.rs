//! Administrator dashboard, ticket triage and user bans.

pub mod ui;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::core::oauth::is_local_redirect;
use crate::core::session::revoke_user_sessions;
use crate::core::shared::models::User;
use crate::core::shared::schema::hub_user;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::urls::HubUrls;
use crate::security::{AuthError, SessionContext};
use crate::tickets::{
    delete_closed_ticket, list_all_tickets, set_ticket_status, DeleteOutcome, TicketStatus,
};

pub const BAN_REASON_MIN_CHARS: usize = 5;

#[derive(Debug)]
pub enum AdminError {
    Auth(AuthError),
    Validation(String),
    NotFound(&'static str),
    Conflict(&'static str),
    Internal(&'static str),
}

impl AdminError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => e.status_code(),
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for AdminError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            Self::Auth(e) => return e.into_response(),
            Self::Validation(msg) => msg,
            Self::NotFound(msg) | Self::Conflict(msg) | Self::Internal(msg) => msg.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

const TICKET_NOT_FOUND: &str = "Ticket not found.";
const USER_NOT_FOUND: &str = "User not found.";
const TICKET_NOT_CLOSED: &str = "Only closed tickets can be deleted.";
const ACTION_FAILED: &str = "Failed to complete the action. Please try again.";

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
    #[serde(default)]
    pub return_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BanForm {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRequest {
    pub reason: String,
    pub expires: Option<DateTime<Utc>>,
}

/// An empty duration bans permanently; otherwise it is a whole number of days.
pub fn validate_ban(form: &BanForm, now: DateTime<Utc>) -> Result<BanRequest, AdminError> {
    let reason = form.reason.trim();
    if reason.chars().count() < BAN_REASON_MIN_CHARS {
        return Err(AdminError::Validation(format!(
            "Reason must be at least {} characters long",
            BAN_REASON_MIN_CHARS
        )));
    }

    let expires = match form.duration.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<i64>() {
            Ok(days) if (1..=36_500).contains(&days) => Some(now + Duration::days(days)),
            _ => {
                return Err(AdminError::Validation(
                    "Duration must be a whole number of days.".to_string(),
                ))
            }
        },
    };

    Ok(BanRequest {
        reason: reason.to_string(),
        expires,
    })
}

fn parse_ticket_id(raw: &str) -> Result<i32, AdminError> {
    raw.parse::<i32>()
        .map_err(|_| AdminError::NotFound(TICKET_NOT_FOUND))
}

pub fn list_users(conn: &mut PgConnection) -> QueryResult<Vec<User>> {
    hub_user::table
        .order(hub_user::created_at.desc())
        .select(User::as_select())
        .load(conn)
}

/// Ban a user and sign them out everywhere.
pub fn ban_user(
    conn: &mut PgConnection,
    user_id: &str,
    ban: &BanRequest,
) -> QueryResult<Option<User>> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let user = diesel::update(hub_user::table.find(user_id))
            .set((
                hub_user::banned.eq(true),
                hub_user::ban_reason.eq(Some(ban.reason.as_str())),
                hub_user::ban_expires.eq(ban.expires),
                hub_user::updated_at.eq(Utc::now()),
            ))
            .returning(User::as_returning())
            .get_result(conn)
            .optional()?;

        if user.is_some() {
            revoke_user_sessions(conn, user_id)?;
        }
        Ok(user)
    })
}

pub fn unban_user(conn: &mut PgConnection, user_id: &str) -> QueryResult<Option<User>> {
    diesel::update(hub_user::table.find(user_id))
        .set((
            hub_user::banned.eq(false),
            hub_user::ban_reason.eq(None::<String>),
            hub_user::ban_expires.eq(None::<DateTime<Utc>>),
            hub_user::updated_at.eq(Utc::now()),
        ))
        .returning(User::as_returning())
        .get_result(conn)
        .optional()
}

pub fn configure_admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(HubUrls::ADMIN, get(admin_page))
        .route(HubUrls::ADMIN_TICKET_STATUS, post(update_ticket_status))
        .route(HubUrls::ADMIN_TICKET_DELETE, post(delete_ticket))
        .route(HubUrls::ADMIN_USER_BAN, post(handle_ban_user))
        .route(HubUrls::ADMIN_USER_UNBAN, post(handle_unban_user))
}

pub async fn admin_page(State(state): State<Arc<AppState>>, ctx: SessionContext) -> Response {
    let current = match ctx.require_admin_page() {
        Ok(current) => current,
        Err(redirect) => return redirect.into_response(),
    };

    let loaded = with_conn(&state.conn, |conn| {
        Ok((list_all_tickets(conn)?, list_users(conn)?))
    })
    .await;

    match loaded {
        Ok((tickets, users)) => Html(ui::render_admin_page(current, &tickets, &users)).into_response(),
        Err(e) => {
            error!("Failed to load admin dashboard: {}", e);
            crate::tickets::ui::error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(current),
                "Unable to load the admin dashboard",
            )
        }
    }
}

pub async fn update_ticket_status(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Path(id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect, AdminError> {
    let current = ctx.require_admin()?;
    let ticket_id = parse_ticket_id(&id)?;
    let status = TicketStatus::parse(&form.status)
        .ok_or_else(|| AdminError::Validation("Invalid status.".to_string()))?;

    let updated = with_conn(&state.conn, move |conn| set_ticket_status(conn, ticket_id, status))
        .await
        .map_err(|e| {
            error!("Failed to update ticket {}: {}", ticket_id, e);
            AdminError::Internal(ACTION_FAILED)
        })?;

    if updated.is_none() {
        return Err(AdminError::NotFound(TICKET_NOT_FOUND));
    }

    info!("Ticket {} set to {} by {}", ticket_id, status, current.user.id);
    let target = form
        .return_to
        .filter(|t| is_local_redirect(t))
        .unwrap_or_else(|| HubUrls::ADMIN.to_string());
    Ok(Redirect::to(&target))
}

pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Path(id): Path<String>,
) -> Result<Redirect, AdminError> {
    let current = ctx.require_admin()?;
    let ticket_id = parse_ticket_id(&id)?;

    let outcome = with_conn(&state.conn, move |conn| delete_closed_ticket(conn, ticket_id))
        .await
        .map_err(|e| {
            error!("Failed to delete ticket {}: {}", ticket_id, e);
            AdminError::Internal(ACTION_FAILED)
        })?;

    match outcome {
        DeleteOutcome::Deleted => {
            info!("Ticket {} deleted by {}", ticket_id, current.user.id);
            Ok(Redirect::to(HubUrls::ADMIN))
        }
        DeleteOutcome::NotFound => Err(AdminError::NotFound(TICKET_NOT_FOUND)),
        DeleteOutcome::NotClosed => Err(AdminError::Conflict(TICKET_NOT_CLOSED)),
    }
}

pub async fn handle_ban_user(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Path(user_id): Path<String>,
    Form(form): Form<BanForm>,
) -> Result<Redirect, AdminError> {
    let current = ctx.require_admin()?;
    if current.user.id == user_id {
        return Err(AdminError::Validation("You cannot ban yourself.".to_string()));
    }
    let ban = validate_ban(&form, Utc::now())?;

    let target = user_id.clone();
    let banned = with_conn(&state.conn, move |conn| ban_user(conn, &target, &ban))
        .await
        .map_err(|e| {
            error!("Failed to ban user {}: {}", user_id, e);
            AdminError::Internal(ACTION_FAILED)
        })?;

    match banned {
        Some(user) => {
            info!("User {} banned by {}", user.id, current.user.id);
            Ok(Redirect::to(HubUrls::ADMIN))
        }
        None => Err(AdminError::NotFound(USER_NOT_FOUND)),
    }
}

pub async fn handle_unban_user(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Path(user_id): Path<String>,
) -> Result<Redirect, AdminError> {
    let current = ctx.require_admin()?;

    let target = user_id.clone();
    let unbanned = with_conn(&state.conn, move |conn| unban_user(conn, &target))
        .await
        .map_err(|e| {
            error!("Failed to unban user {}: {}", user_id, e);
            AdminError::Internal(ACTION_FAILED)
        })?;

    match unbanned {
        Some(user) => {
            info!("User {} unbanned by {}", user.id, current.user.id);
            Ok(Redirect::to(HubUrls::ADMIN))
        }
        None => Err(AdminError::NotFound(USER_NOT_FOUND)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::models::ROLE_ADMIN;
    use crate::core::shared::test_utils::{signed_in, signed_in_user, TestAppStateBuilder};
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn app() -> Router {
        configure_admin_routes().with_state(Arc::new(TestAppStateBuilder::new().build()))
    }

    fn form_request(uri: &str, body: &str, ctx: SessionContext) -> Request<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        request.extensions_mut().insert(ctx);
        request
    }

    #[test]
    fn test_validate_ban_reason_length() {
        let form = BanForm {
            reason: " spam ".to_string(),
            duration: None,
        };
        let err = validate_ban(&form, Utc::now()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        match err {
            AdminError::Validation(msg) => {
                assert_eq!(msg, "Reason must be at least 5 characters long")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_validate_ban_duration() {
        let now = Utc::now();
        let permanent = validate_ban(
            &BanForm {
                reason: "Repeated abuse".to_string(),
                duration: Some("".to_string()),
            },
            now,
        )
        .unwrap();
        assert_eq!(permanent.expires, None);

        let week = validate_ban(
            &BanForm {
                reason: "Repeated abuse".to_string(),
                duration: Some("7".to_string()),
            },
            now,
        )
        .unwrap();
        assert_eq!(week.expires, Some(now + Duration::days(7)));

        for bad in ["0", "-3", "two"] {
            let form = BanForm {
                reason: "Repeated abuse".to_string(),
                duration: Some(bad.to_string()),
            };
            assert!(validate_ban(&form, now).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            AdminError::Conflict(TICKET_NOT_CLOSED).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AdminError::NotFound(USER_NOT_FOUND).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AdminError::Auth(AuthError::AdminRequired).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_non_admin_cannot_delete_ticket() {
        let response = app()
            .oneshot(form_request("/admin/tickets/1/delete", "", signed_in_user()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_anonymous_cannot_change_status() {
        let response = app()
            .oneshot(form_request(
                "/admin/tickets/1/status",
                "status=closed",
                SessionContext::anonymous(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_cannot_ban_self() {
        let response = app()
            .oneshot(form_request(
                "/admin/users/admin-1/ban",
                "reason=testing+bans",
                signed_in("admin-1", ROLE_ADMIN),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_status_update_rejects_unknown_status() {
        let response = app()
            .oneshot(form_request(
                "/admin/tickets/1/status",
                "status=resolved",
                signed_in("admin-1", ROLE_ADMIN),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_page_redirects_non_admin() {
        let mut request = Request::builder()
            .uri("/admin")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(signed_in_user());
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    }
}
