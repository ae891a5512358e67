//! Browser sessions backed by `hub_session`.
//!
//! All functions here are blocking diesel calls; async callers run them on
//! `tokio::task::spawn_blocking`.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use tower_cookies::cookie::{time, SameSite};
use tower_cookies::Cookie;

use crate::core::shared::models::{NewSession, Session, User};
use crate::core::shared::schema::{hub_session, hub_user};
use crate::core::shared::utils::{generate_token, new_id};

pub const SESSION_COOKIE: &str = "hub.session_token";
pub const SESSION_TTL_DAYS: i64 = 7;

/// Sessions older than this are refreshed on use so "last active" stays meaningful.
const TOUCH_INTERVAL_MINUTES: i64 = 60;

pub fn create_session(
    conn: &mut PgConnection,
    user_id: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> QueryResult<Session> {
    let id = new_id();
    let token = generate_token();
    let new_session = NewSession {
        id: &id,
        token: &token,
        ip_address,
        user_agent,
        user_id,
        expires_at: Utc::now() + Duration::days(SESSION_TTL_DAYS),
    };

    diesel::insert_into(hub_session::table)
        .values(&new_session)
        .returning(Session::as_returning())
        .get_result(conn)
}

/// Resolve a cookie token to its unexpired session and owner.
pub fn find_active_session(
    conn: &mut PgConnection,
    token: &str,
) -> QueryResult<Option<(Session, User)>> {
    let found = hub_session::table
        .inner_join(hub_user::table)
        .filter(hub_session::token.eq(token))
        .filter(hub_session::expires_at.gt(Utc::now()))
        .select((Session::as_select(), User::as_select()))
        .first::<(Session, User)>(conn)
        .optional()?;

    match found {
        Some((session, user)) if needs_touch(&session, Utc::now()) => {
            let session = touch_session(conn, &session.id)?;
            Ok(Some((session, user)))
        }
        other => Ok(other),
    }
}

fn needs_touch(session: &Session, now: DateTime<Utc>) -> bool {
    now - session.updated_at > Duration::minutes(TOUCH_INTERVAL_MINUTES)
}

fn touch_session(conn: &mut PgConnection, session_id: &str) -> QueryResult<Session> {
    diesel::update(hub_session::table.find(session_id))
        .set(hub_session::updated_at.eq(Utc::now()))
        .returning(Session::as_returning())
        .get_result(conn)
}

pub fn list_user_sessions(conn: &mut PgConnection, user_id: &str) -> QueryResult<Vec<Session>> {
    hub_session::table
        .filter(hub_session::user_id.eq(user_id))
        .filter(hub_session::expires_at.gt(Utc::now()))
        .order(hub_session::updated_at.desc())
        .select(Session::as_select())
        .load(conn)
}

pub fn revoke_other_sessions(
    conn: &mut PgConnection,
    user_id: &str,
    keep_session_id: &str,
) -> QueryResult<usize> {
    diesel::delete(
        hub_session::table
            .filter(hub_session::user_id.eq(user_id))
            .filter(hub_session::id.ne(keep_session_id)),
    )
    .execute(conn)
}

pub fn revoke_user_sessions(conn: &mut PgConnection, user_id: &str) -> QueryResult<usize> {
    diesel::delete(hub_session::table.filter(hub_session::user_id.eq(user_id))).execute(conn)
}

pub fn delete_session(conn: &mut PgConnection, session_id: &str) -> QueryResult<usize> {
    diesel::delete(hub_session::table.find(session_id)).execute(conn)
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(SESSION_TTL_DAYS))
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
