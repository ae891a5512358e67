use crate::core::oauth::{OAuthState, OAuthTokenResponse, OAuthUserInfo, PROVIDER_ID};
use crate::core::rate_limit::ClientIp;
use crate::core::session::{create_session, session_cookie};
use crate::core::shared::models::{Account, NewAccount, NewUser, User, ROLE_ADMIN, ROLE_USER};
use crate::core::shared::schema::{hub_account, hub_user};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{html_escape, lower, new_id};
use crate::core::urls::HubUrls;
use crate::security::SessionContext;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use tower_cookies::cookie::{time, SameSite};
use tower_cookies::{Cookie, Cookies};

pub const OAUTH_STATE_COOKIE: &str = "hub.oauth_state";

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(HubUrls::LOGIN, get(login))
        .route(HubUrls::DISCORD_CALLBACK, get(discord_callback))
}

fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    (
        status,
        Html(format!(
            r#"<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body>
    <h1>{title}</h1>
    <p>{message}</p>
    <a href="{login}">Try Again</a>
</body>
</html>"#,
            title = html_escape(title),
            message = html_escape(message),
            login = HubUrls::LOGIN,
        )),
    )
        .into_response()
}

async fn login(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    cookies: Cookies,
    Query(params): Query<LoginParams>,
) -> Response {
    if ctx.is_authenticated() {
        return Redirect::to(HubUrls::DASHBOARD).into_response();
    }

    if !state.discord.config.is_valid() {
        warn!("Discord OAuth is not configured");
        return error_page(
            StatusCode::SERVICE_UNAVAILABLE,
            "Login Unavailable",
            "Discord login is not currently configured.",
        );
    }

    let oauth_state = OAuthState::new(params.redirect);
    cookies.add(
        Cookie::build((OAUTH_STATE_COOKIE, oauth_state.token.clone()))
            .path("/")
            .http_only(true)
            .secure(state.config.server.base_url.starts_with("https://"))
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(crate::core::oauth::STATE_TTL_SECS))
            .build(),
    );

    Redirect::to(&state.discord.build_auth_url(&oauth_state.encode())).into_response()
}

async fn discord_callback(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    if let Some(error) = &params.error {
        let description = params.error_description.as_deref().unwrap_or_default();
        warn!("Discord returned an OAuth error: {} {}", error, description);
        return error_page(
            StatusCode::UNAUTHORIZED,
            "Login Failed",
            &format!("Discord returned an error: {} {}", error, description),
        );
    }

    let Some(code) = params.code.as_deref() else {
        return error_page(
            StatusCode::BAD_REQUEST,
            "Missing Authorization Code",
            "The OAuth callback did not include an authorization code.",
        );
    };

    let Some(oauth_state) = params.state.as_deref().and_then(OAuthState::decode) else {
        warn!("Failed to decode OAuth state parameter");
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid State",
            "The OAuth state parameter could not be validated.",
        );
    };

    let expected = cookies.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    cookies.remove(Cookie::build((OAUTH_STATE_COOKIE, "")).path("/").build());
    if expected.as_deref() != Some(oauth_state.token.as_str()) {
        warn!("OAuth state does not match the browser cookie");
        return error_page(
            StatusCode::BAD_REQUEST,
            "Invalid State",
            "The OAuth state parameter could not be validated.",
        );
    }

    if oauth_state.is_expired() {
        warn!("OAuth state expired");
        return error_page(
            StatusCode::BAD_REQUEST,
            "Session Expired",
            "The login session has expired. Please try again.",
        );
    }

    let token = match state.discord.exchange_code(code, &state.http_client).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to exchange OAuth code: {}", e);
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login Failed",
                "Failed to complete the Discord login.",
            );
        }
    };

    let user_info = match state
        .discord
        .fetch_user_info(&token.access_token, &state.http_client)
        .await
    {
        Ok(info) => info,
        Err(e) => {
            error!("Failed to fetch user info: {}", e);
            return error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login Failed",
                "Failed to retrieve your Discord profile.",
            );
        }
    };

    let Some(email) = verified_email(&user_info) else {
        warn!(
            "Discord user {} has no verified email address",
            user_info.provider_id
        );
        return error_page(
            StatusCode::BAD_REQUEST,
            "Email Required",
            "Your Discord account needs a verified email address to sign in.",
        );
    };

    let is_admin = state.config.is_admin_email(email);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let conn = state.conn.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut db_conn = conn
            .get()
            .map_err(|e| anyhow::anyhow!("DB connection error: {}", e))?;
        sign_in_discord_user(
            &mut db_conn,
            &user_info,
            &token,
            is_admin,
            Some(client_ip.as_str()),
            user_agent.as_deref(),
        )
    })
    .await
    .map_err(|e| anyhow::anyhow!("Task error: {}", e))
    .and_then(|r| r);

    match outcome {
        Ok(SignInOutcome::SignedIn { user, session_token }) => {
            info!("Discord login successful for {} ({})", user.name, user.email);
            cookies.add(session_cookie(
                session_token,
                state.config.server.base_url.starts_with("https://"),
            ));
            let target = oauth_state
                .redirect_after
                .unwrap_or_else(|| HubUrls::DASHBOARD.to_string());
            debug!("OAuth complete, redirecting to {}", target);
            Redirect::to(&target).into_response()
        }
        Ok(SignInOutcome::Banned { reason, expires }) => {
            let until = expires
                .map(|e| format!(" until {}", e.format("%Y-%m-%d %H:%M UTC")))
                .unwrap_or_default();
            error_page(
                StatusCode::FORBIDDEN,
                "Account Banned",
                &format!(
                    "You have been banned from this application{}. Reason: {}",
                    until,
                    reason.as_deref().unwrap_or("No reason given")
                ),
            )
        }
        Err(e) => {
            error!("Failed to sign in Discord user: {}", e);
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login Failed",
                "Failed to create your session.",
            )
        }
    }
}

#[derive(Debug)]
pub enum SignInOutcome {
    SignedIn { user: User, session_token: String },
    Banned {
        reason: Option<String>,
        expires: Option<DateTime<Utc>>,
    },
}

/// The profile email, only once Discord has verified it. Nothing else may be
/// matched against existing users or `ADMIN_EMAILS`.
pub fn verified_email(info: &OAuthUserInfo) -> Option<&str> {
    info.email.as_deref().filter(|_| info.email_verified)
}

/// Link the Discord identity to a hub user, creating both on first sign-in,
/// then open a browser session.
pub fn sign_in_discord_user(
    conn: &mut PgConnection,
    info: &OAuthUserInfo,
    token: &OAuthTokenResponse,
    is_admin: bool,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> anyhow::Result<SignInOutcome> {
    let email = verified_email(info)
        .ok_or_else(|| anyhow::anyhow!("Discord profile has no verified email"))?;
    let now = Utc::now();
    let token_expires = token.expires_in.map(|secs| now + Duration::seconds(secs));

    conn.transaction::<_, anyhow::Error, _>(|conn| {
        let account: Option<Account> = hub_account::table
            .filter(hub_account::provider_id.eq(PROVIDER_ID))
            .filter(hub_account::account_id.eq(&info.provider_id))
            .select(Account::as_select())
            .first(conn)
            .optional()?;

        let user_id = match account {
            Some(account) => {
                diesel::update(hub_account::table.find(&account.id))
                    .set((
                        hub_account::access_token.eq(&token.access_token),
                        hub_account::refresh_token.eq(token.refresh_token.as_deref()),
                        hub_account::access_token_expires_at.eq(token_expires),
                        hub_account::scope.eq(token.scope.as_deref()),
                        hub_account::updated_at.eq(now),
                    ))
                    .execute(conn)?;
                account.user_id
            }
            None => {
                let existing: Option<String> = hub_user::table
                    .filter(lower(hub_user::email).eq(email.to_lowercase()))
                    .select(hub_user::id)
                    .first(conn)
                    .optional()?;

                let user_id = match existing {
                    Some(id) => id,
                    None => {
                        let id = new_id();
                        let fallback_name = email.split('@').next().unwrap_or(email);
                        diesel::insert_into(hub_user::table)
                            .values(&NewUser {
                                id: &id,
                                name: info.name.as_deref().unwrap_or(fallback_name),
                                email,
                                email_verified: true,
                                image: info.avatar_url.as_deref(),
                                role: if is_admin { ROLE_ADMIN } else { ROLE_USER },
                            })
                            .execute(conn)?;
                        debug!("Created user {} for Discord account {}", id, info.provider_id);
                        id
                    }
                };

                let account_id = new_id();
                diesel::insert_into(hub_account::table)
                    .values(&NewAccount {
                        id: &account_id,
                        account_id: &info.provider_id,
                        provider_id: PROVIDER_ID,
                        access_token: Some(&token.access_token),
                        refresh_token: token.refresh_token.as_deref(),
                        access_token_expires_at: token_expires,
                        scope: token.scope.as_deref(),
                        user_id: &user_id,
                    })
                    .execute(conn)?;
                user_id
            }
        };

        let mut user: User = hub_user::table
            .find(&user_id)
            .select(User::as_select())
            .first(conn)?;

        if is_admin && !user.is_admin() {
            user = diesel::update(hub_user::table.find(&user_id))
                .set((hub_user::role.eq(ROLE_ADMIN), hub_user::updated_at.eq(now)))
                .returning(User::as_returning())
                .get_result(conn)?;
        }

        if user.banned {
            if user.is_banned_at(now) {
                warn!("Refusing sign-in for banned user {}", user.id);
                return Ok(SignInOutcome::Banned {
                    reason: user.ban_reason,
                    expires: user.ban_expires,
                });
            }
            user = diesel::update(hub_user::table.find(&user_id))
                .set((
                    hub_user::banned.eq(false),
                    hub_user::ban_reason.eq(None::<String>),
                    hub_user::ban_expires.eq(None::<DateTime<Utc>>),
                    hub_user::updated_at.eq(now),
                ))
                .returning(User::as_returning())
                .get_result(conn)?;
            info!("Lifted expired ban for user {}", user.id);
        }

        let session = create_session(conn, &user.id, ip_address, user_agent)?;
        Ok(SignInOutcome::SignedIn {
            user,
            session_token: session.token,
        })
    })
}
