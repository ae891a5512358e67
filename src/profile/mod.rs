//! Profile editing, email-change verification and browser session management.

pub mod ui;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::{error, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::core::session::{delete_session, list_user_sessions, removal_cookie, revoke_other_sessions};
use crate::core::shared::models::{NewVerification, Session, User, Verification};
use crate::core::shared::schema::{hub_user, hub_verification};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{generate_token, lower, with_conn};
use crate::core::urls::HubUrls;
use crate::email::{email_change_verification, is_valid_email};
use crate::security::{CurrentSession, SessionContext};

pub const EMAIL_CHANGE_TTL_HOURS: i64 = 1;
pub const NAME_MAX_CHARS: usize = 64;
const EMAIL_CHANGE_PREFIX: &str = "email-change:";

/// Outcome banner shown at the top of the profile page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Saved,
    EmailSent,
    EmailVerified,
    SessionsRevoked,
}

impl Notice {
    pub fn parse(s: &str) -> Option<Notice> {
        match s {
            "saved" => Some(Notice::Saved),
            "email-sent" => Some(Notice::EmailSent),
            "email-verified" => Some(Notice::EmailVerified),
            "sessions-revoked" => Some(Notice::SessionsRevoked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Notice::Saved => "saved",
            Notice::EmailSent => "email-sent",
            Notice::EmailVerified => "email-verified",
            Notice::SessionsRevoked => "sessions-revoked",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Notice::Saved => "Profile updated successfully.",
            Notice::EmailSent => {
                "Profile updated successfully. Please check your new email to verify the change."
            }
            Notice::EmailVerified => "Your email address has been updated.",
            Notice::SessionsRevoked => "Logged out of other browser sessions.",
        }
    }

    fn redirect(&self) -> Redirect {
        Redirect::to(&format!("{}?notice={}", HubUrls::PROFILE, self.as_str()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// What a profile form submission changes for `user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileChange {
    pub name: Option<String>,
    pub email: Option<String>,
}

pub fn validate_profile_form(user: &User, form: &ProfileForm) -> Result<ProfileChange, String> {
    let name = form.name.trim();
    let email = form.email.trim().to_lowercase();

    if name.is_empty() {
        return Err("Name is required.".to_string());
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(format!("Name must be at most {} characters long", NAME_MAX_CHARS));
    }
    if !is_valid_email(&email) {
        return Err("Invalid email address.".to_string());
    }

    Ok(ProfileChange {
        name: (name != user.name).then(|| name.to_string()),
        email: (email != user.email.to_lowercase()).then_some(email),
    })
}

/// Best-effort "{browser} on {os}" label for a stored user agent.
pub fn describe_user_agent(user_agent: Option<&str>) -> String {
    let ua = user_agent.unwrap_or_default();

    let browser = if ua.contains("Edg/") {
        "Edge"
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("Firefox/") {
        "Firefox"
    } else if ua.contains("Chrome/") || ua.contains("CriOS/") {
        "Chrome"
    } else if ua.contains("Safari/") {
        "Safari"
    } else {
        "Unknown Browser"
    };

    let os = if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
        "macOS"
    } else if ua.contains("CrOS") {
        "Chrome OS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Unknown OS"
    };

    format!("{} on {}", browser, os)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailChangeOutcome {
    Applied(String),
    Invalid,
    EmailInUse,
}

pub fn update_user_name(conn: &mut PgConnection, user_id: &str, name: &str) -> QueryResult<usize> {
    diesel::update(hub_user::table.find(user_id))
        .set((hub_user::name.eq(name), hub_user::updated_at.eq(Utc::now())))
        .execute(conn)
}

fn email_taken_by_other(conn: &mut PgConnection, user_id: &str, email: &str) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(
        hub_user::table
            .filter(lower(hub_user::email).eq(email.to_lowercase()))
            .filter(hub_user::id.ne(user_id)),
    ))
    .get_result(conn)
}

/// Store a pending email change, replacing any earlier one. Returns the token.
pub fn create_email_change(
    conn: &mut PgConnection,
    user_id: &str,
    new_email: &str,
) -> QueryResult<String> {
    let identifier = format!("{}{}", EMAIL_CHANGE_PREFIX, user_id);
    let token = generate_token();

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(hub_verification::table.filter(hub_verification::identifier.eq(&identifier)))
            .execute(conn)?;
        diesel::insert_into(hub_verification::table)
            .values(&NewVerification {
                id: &token,
                identifier: &identifier,
                value: new_email,
                expires_at: Utc::now() + Duration::hours(EMAIL_CHANGE_TTL_HOURS),
            })
            .execute(conn)?;
        Ok(())
    })?;

    Ok(token)
}

/// Apply a pending email change. Tokens are single use.
pub fn apply_email_change(conn: &mut PgConnection, token: &str) -> QueryResult<EmailChangeOutcome> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let pending = hub_verification::table
            .find(token)
            .filter(hub_verification::expires_at.gt(Utc::now()))
            .select(Verification::as_select())
            .first(conn)
            .optional()?;

        let Some(pending) = pending else {
            return Ok(EmailChangeOutcome::Invalid);
        };
        let Some(user_id) = pending.identifier.strip_prefix(EMAIL_CHANGE_PREFIX) else {
            return Ok(EmailChangeOutcome::Invalid);
        };

        if email_taken_by_other(conn, user_id, &pending.value)? {
            return Ok(EmailChangeOutcome::EmailInUse);
        }

        let updated = diesel::update(hub_user::table.find(user_id))
            .set((
                hub_user::email.eq(&pending.value),
                hub_user::email_verified.eq(true),
                hub_user::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

        diesel::delete(hub_verification::table.find(&pending.id)).execute(conn)?;

        if updated == 0 {
            return Ok(EmailChangeOutcome::Invalid);
        }
        Ok(EmailChangeOutcome::Applied(pending.value))
    })
}

pub fn configure_profile_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(HubUrls::PROFILE, get(profile_page).post(update_profile))
        .route(HubUrls::PROFILE_VERIFY_EMAIL, get(verify_email))
        .route(HubUrls::PROFILE_REVOKE_OTHERS, post(handle_revoke_other_sessions))
        .route(HubUrls::LOGOUT, post(logout))
}

async fn load_other_sessions(state: &AppState, current: &CurrentSession) -> anyhow::Result<Vec<Session>> {
    let user_id = current.user.id.clone();
    let current_id = current.session.id.clone();
    let sessions = with_conn(&state.conn, move |conn| list_user_sessions(conn, &user_id)).await?;
    Ok(sessions.into_iter().filter(|s| s.id != current_id).collect())
}

async fn render_profile(
    state: &AppState,
    current: &CurrentSession,
    status: StatusCode,
    notice: Option<Notice>,
    error: Option<&str>,
) -> Response {
    match load_other_sessions(state, current).await {
        Ok(sessions) => (
            status,
            Html(ui::render_profile_page(current, &sessions, notice, error)),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to load sessions for {}: {}", current.user.id, e);
            crate::tickets::ui::error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(current),
                "Unable to load your profile",
            )
        }
    }
}

pub async fn profile_page(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Query(query): Query<NoticeQuery>,
) -> Response {
    let current = match ctx.require_page() {
        Ok(current) => current,
        Err(redirect) => return redirect.into_response(),
    };
    let notice = query.notice.as_deref().and_then(Notice::parse);
    render_profile(&state, current, StatusCode::OK, notice, None).await
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Form(form): Form<ProfileForm>,
) -> Response {
    let current = match ctx.require_page() {
        Ok(current) => current,
        Err(redirect) => return redirect.into_response(),
    };

    let change = match validate_profile_form(&current.user, &form) {
        Ok(change) => change,
        Err(message) => {
            return render_profile(&state, current, StatusCode::BAD_REQUEST, None, Some(message.as_str())).await
        }
    };

    if let Some(name) = change.name {
        let user_id = current.user.id.clone();
        if let Err(e) = with_conn(&state.conn, move |conn| update_user_name(conn, &user_id, &name)).await {
            error!("Failed to update name for {}: {}", current.user.id, e);
            return render_profile(
                &state,
                current,
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                Some("Failed to update profile. Please try again."),
            )
            .await;
        }
    }

    let Some(new_email) = change.email else {
        return Notice::Saved.redirect().into_response();
    };

    let user_id = current.user.id.clone();
    let email = new_email.clone();
    let token = match with_conn(&state.conn, move |conn| {
        if email_taken_by_other(conn, &user_id, &email)? {
            return Ok(None);
        }
        create_email_change(conn, &user_id, &email).map(Some)
    })
    .await
    {
        Ok(Some(token)) => token,
        Ok(None) => {
            return render_profile(
                &state,
                current,
                StatusCode::BAD_REQUEST,
                None,
                Some("That email address is already in use."),
            )
            .await
        }
        Err(e) => {
            error!("Failed to start email change for {}: {}", current.user.id, e);
            return render_profile(
                &state,
                current,
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                Some("Failed to update profile. Please try again."),
            )
            .await;
        }
    };

    let verify_url = format!(
        "{}{}?token={}",
        state.config.server.base_url,
        HubUrls::PROFILE_VERIFY_EMAIL,
        urlencoding::encode(&token)
    );
    let message = email_change_verification(&new_email, &current.user.name, &verify_url);
    if let Err(e) = state.mailer.send(message).await {
        warn!("Verification email for {} failed: {:#}", current.user.id, e);
        return render_profile(
            &state,
            current,
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            Some("Failed to send the verification email. Please try again."),
        )
        .await;
    }

    info!("Email change requested by {}", current.user.id);
    Notice::EmailSent.redirect().into_response()
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return crate::tickets::ui::error_page(
            StatusCode::BAD_REQUEST,
            ctx.current(),
            "Missing verification token.",
        );
    };

    match with_conn(&state.conn, move |conn| apply_email_change(conn, &token)).await {
        Ok(EmailChangeOutcome::Applied(email)) => {
            info!("Email change to {} verified", email);
            Notice::EmailVerified.redirect().into_response()
        }
        Ok(EmailChangeOutcome::Invalid) => crate::tickets::ui::error_page(
            StatusCode::BAD_REQUEST,
            ctx.current(),
            "This verification link is invalid or has expired.",
        ),
        Ok(EmailChangeOutcome::EmailInUse) => crate::tickets::ui::error_page(
            StatusCode::CONFLICT,
            ctx.current(),
            "That email address is already in use.",
        ),
        Err(e) => {
            error!("Failed to verify email change: {}", e);
            crate::tickets::ui::error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                ctx.current(),
                "Unable to verify your email right now.",
            )
        }
    }
}

pub async fn handle_revoke_other_sessions(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
) -> Response {
    let current = match ctx.require_page() {
        Ok(current) => current,
        Err(redirect) => return redirect.into_response(),
    };

    let user_id = current.user.id.clone();
    let keep = current.session.id.clone();
    match with_conn(&state.conn, move |conn| revoke_other_sessions(conn, &user_id, &keep)).await {
        Ok(count) => {
            info!("Revoked {} other sessions for {}", count, current.user.id);
            Notice::SessionsRevoked.redirect().into_response()
        }
        Err(e) => {
            error!("Failed to revoke sessions for {}: {}", current.user.id, e);
            render_profile(
                &state,
                current,
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                Some("Failed to log out of other browser sessions."),
            )
            .await
        }
    }
}

pub async fn logout(State(state): State<Arc<AppState>>, ctx: SessionContext, cookies: Cookies) -> Redirect {
    if let Some(current) = ctx.current() {
        let session_id = current.session.id.clone();
        if let Err(e) = with_conn(&state.conn, move |conn| delete_session(conn, &session_id)).await {
            error!("Failed to delete session on logout: {}", e);
        }
    }
    cookies.remove(removal_cookie());
    Redirect::to(HubUrls::HOME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::models::ROLE_USER;
    use crate::core::shared::test_utils::{live_db_pool, sample_user, seed_user};
    use crate::core::shared::utils::new_id;

    fn form(name: &str, email: &str) -> ProfileForm {
        ProfileForm {
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    #[test]
    fn test_describe_user_agent() {
        let cases = [
            (
                Some("Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"),
                "Firefox on Linux",
            ),
            (
                Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0"),
                "Edge on Windows",
            ),
            (
                Some("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15"),
                "Safari on macOS",
            ),
            (
                Some("Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36"),
                "Chrome on Android",
            ),
            (None, "Unknown Browser on Unknown OS"),
            (Some("curl/8.5.0"), "Unknown Browser on Unknown OS"),
        ];
        for (ua, expected) in cases {
            assert_eq!(describe_user_agent(ua), expected);
        }
    }

    #[test]
    fn test_validate_profile_form_detects_changes() {
        let user = sample_user("user-1", ROLE_USER);

        let unchanged = validate_profile_form(&user, &form(&user.name, &user.email)).unwrap();
        assert_eq!(unchanged, ProfileChange { name: None, email: None });

        let changed = validate_profile_form(&user, &form(" Lasse ", "NEW@Example.com")).unwrap();
        assert_eq!(changed.name.as_deref(), Some("Lasse"));
        assert_eq!(changed.email.as_deref(), Some("new@example.com"));
    }

    #[test]
    fn test_validate_profile_form_rejects_bad_input() {
        let user = sample_user("user-1", ROLE_USER);
        assert_eq!(
            validate_profile_form(&user, &form("  ", &user.email)).unwrap_err(),
            "Name is required."
        );
        assert_eq!(
            validate_profile_form(&user, &form("Lasse", "not-an-email")).unwrap_err(),
            "Invalid email address."
        );
        let long = "x".repeat(NAME_MAX_CHARS + 1);
        assert!(validate_profile_form(&user, &form(&long, &user.email)).is_err());
    }

    #[test]
    fn test_notice_round_trip() {
        for notice in [Notice::Saved, Notice::EmailSent, Notice::EmailVerified, Notice::SessionsRevoked] {
            assert_eq!(Notice::parse(notice.as_str()), Some(notice));
        }
        assert_eq!(Notice::parse("bogus"), None);
    }

    #[tokio::test]
    async fn test_profile_requires_session() {
        let state = Arc::new(crate::core::shared::test_utils::TestAppStateBuilder::new().build());
        let response = profile_page(
            State(state),
            SessionContext::anonymous(),
            Query(NoticeQuery::default()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/login");
    }

    #[test]
    fn test_email_taken_ignores_case() {
        let Some(pool) = live_db_pool() else {
            return;
        };
        let mut conn = pool.get().unwrap();
        let stored = format!("Mixed-{}@Example.com", new_id());
        let holder = seed_user(&mut conn, ROLE_USER, Some(&stored));
        let other = seed_user(&mut conn, ROLE_USER, None);

        assert!(email_taken_by_other(&mut conn, &other.id, &stored.to_lowercase()).unwrap());
        assert!(!email_taken_by_other(&mut conn, &holder.id, &stored.to_lowercase()).unwrap());

        // The unique index rejects a second row that differs only in case.
        let duplicate = diesel::insert_into(hub_user::table)
            .values(&crate::core::shared::models::NewUser {
                id: &new_id(),
                name: "Duplicate",
                email: &stored.to_uppercase(),
                email_verified: true,
                image: None,
                role: ROLE_USER,
            })
            .execute(&mut conn);
        assert!(duplicate.is_err());
    }
}
