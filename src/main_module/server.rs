//! HTTP server initialization and routing

use axum::{middleware, routing::get, Router};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;

use crate::admin::configure_admin_routes;
use crate::core::oauth::routes as oauth_routes;
use crate::core::shared::state::AppState;
use crate::core::urls::HubUrls;
use crate::pages::configure_pages_routes;
use crate::profile::configure_profile_routes;
use crate::security::{security_headers_middleware, session_middleware};
use crate::tickets::configure_tickets_routes;
use crate::tickets::ui::configure_tickets_ui_routes;

use super::{health_check, health_check_simple, shutdown_signal};

/// Full application router.
///
/// Layers run outermost first: tracing, security headers, cookie jar, then
/// session resolution, which needs the cookie jar.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(HubUrls::HEALTH, get(health_check_simple))
        .route(HubUrls::API_HEALTH, get(health_check))
        .merge(configure_pages_routes())
        .merge(configure_tickets_routes())
        .merge(configure_tickets_ui_routes())
        .merge(configure_admin_routes())
        .merge(configure_profile_routes())
        .merge(oauth_routes::configure())
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            session_middleware,
        ))
        .layer(CookieManagerLayer::new())
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn run_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let addr = app_state.config.bind_address();
    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(
                "Failed to bind to {}: {} - is another instance running?",
                addr, e
            );
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);

    // Client addresses feed the rate limiter when no proxy header is present.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate_limit::{InMemoryWindowCounter, RATE_LIMITED_MESSAGE};
    use crate::core::shared::models::{User, ROLE_ADMIN, ROLE_USER};
    use crate::core::shared::test_utils::{
        live_db_pool, sample_session, seed_ticket, seed_user, signed_in, signed_in_user,
        RecordingMailer, TestAppStateBuilder,
    };
    use crate::core::shared::utils::new_id;
    use crate::core::urls::with_id;
    use crate::security::SessionContext;
    use crate::tickets::{find_ticket, TicketStatus};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn submit(ip: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(HubUrls::SUBMIT_TICKET)
            .header("x-forwarded-for", ip)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_submit_rate_limit_in_production() {
        let app = build_router(Arc::new(TestAppStateBuilder::new().production().build()));
        let body = r#"{"reason":"Other","description":"Something is broken"}"#;

        for remaining in (0..5).rev() {
            let response = app.clone().oneshot(submit("203.0.113.7", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(response.headers()["x-ratelimit-limit"], "5");
            assert_eq!(
                response.headers()["x-ratelimit-remaining"],
                remaining.to_string().as_str()
            );
        }

        let response = app.clone().oneshot(submit("203.0.113.7", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(json_body(response).await["error"], RATE_LIMITED_MESSAGE);

        // Another client has its own window.
        let response = app.oneshot(submit("198.51.100.1", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
    }

    #[tokio::test]
    async fn test_submit_rejects_malformed_body_for_signed_in_user() {
        let app = build_router(Arc::new(TestAppStateBuilder::new().build()));
        let mut request = submit("203.0.113.8", "{not json");
        request.extensions_mut().insert(signed_in_user());

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["x-ratelimit-limit"], "100");
        assert_eq!(json_body(response).await["error"], "Invalid request body.");
    }

    #[tokio::test]
    async fn test_submit_validation_runs_before_insert() {
        let app = build_router(Arc::new(TestAppStateBuilder::new().build()));
        let mut request = submit("203.0.113.9", r#"{"reason":"-","description":"Something is broken"}"#);
        request.extensions_mut().insert(signed_in_user());

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Please select a reason.");
    }

    #[tokio::test]
    async fn test_submit_short_description_never_reaches_database() {
        let app = build_router(Arc::new(TestAppStateBuilder::new().build()));
        let mut request = submit("203.0.113.11", r#"{"reason":"Abuse","description":"too short"}"#);
        request.extensions_mut().insert(signed_in_user());

        // The test pool cannot connect, so an insert attempt would surface as 500.
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "Description must be at least 10 characters long"
        );
    }

    #[tokio::test]
    async fn test_submit_database_failure_is_generic_500() {
        let app = build_router(Arc::new(TestAppStateBuilder::new().build()));
        let mut request = submit(
            "203.0.113.10",
            r#"{"reason":"Bug Report","description":"Something is broken"}"#,
        );
        request.extensions_mut().insert(signed_in_user());

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("x-ratelimit-reset"));
        assert_eq!(json_body(response).await["error"], "Failed to create support ticket.");
    }

    #[tokio::test]
    async fn test_pages_redirect_anonymous_to_login() {
        let app = build_router(Arc::new(TestAppStateBuilder::new().build()));
        for uri in ["/dashboard", "/tickets", "/tickets/1", "/profile", "/admin"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
            assert_eq!(response.headers()[header::LOCATION], "/login", "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_admin_redirects_non_admin_to_dashboard() {
        let app = build_router(Arc::new(TestAppStateBuilder::new().build()));
        let mut request = Request::builder().uri("/admin").body(Body::empty()).unwrap();
        request.extensions_mut().insert(signed_in_user());

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = build_router(Arc::new(TestAppStateBuilder::new().build()));

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-frame-options"], "DENY");

        let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["database"], false);
    }

    #[tokio::test]
    async fn test_landing_page_is_public() {
        let app = build_router(Arc::new(TestAppStateBuilder::new().build()));
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request.extensions_mut().insert(SessionContext::anonymous());

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&html).contains("Login / Register"));
    }

    fn as_owner(user: &User) -> SessionContext {
        SessionContext::signed_in(sample_session(&new_id(), &user.id), user.clone())
    }

    #[tokio::test]
    async fn test_submit_success_stores_ticket_and_notifies_support() {
        let Some(pool) = live_db_pool() else {
            return;
        };
        let user = seed_user(&mut pool.get().unwrap(), ROLE_USER, None);
        let mailer = Arc::new(RecordingMailer::new());
        let app = build_router(Arc::new(
            TestAppStateBuilder::new()
                .with_pool(pool.clone())
                .with_mailer(mailer.clone())
                .with_rate_limiter(Arc::new(InMemoryWindowCounter::new()))
                .build(),
        ));

        let mut request = submit(
            "203.0.113.30",
            r#"{"reason":"Other","description":"<b>line1</b>\nline2 long"}"#,
        );
        request.extensions_mut().insert(as_owner(&user));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        let ticket_id = body["id"].as_i64().unwrap() as i32;

        let ticket = find_ticket(&mut pool.get().unwrap(), ticket_id)
            .unwrap()
            .unwrap();
        assert_eq!(ticket.user_id, user.id);
        assert_eq!(ticket.status(), Some(TicketStatus::Open));
        assert_eq!(ticket.reason, "Other");
        assert_eq!(ticket.description, "<b>line1</b>\nline2 long");

        let sent = mailer.get_sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "support@example.com");
        assert_eq!(sent[0].subject, "[Support Ticket] Other");
        assert!(sent[0].html.contains("&lt;b&gt;line1&lt;/b&gt;<br />line2 long"));
    }

    #[tokio::test]
    async fn test_admin_deletes_closed_ticket_but_not_open_one() {
        let Some(pool) = live_db_pool() else {
            return;
        };
        let (closed, open) = {
            let mut conn = pool.get().unwrap();
            let owner = seed_user(&mut conn, ROLE_USER, None);
            (
                seed_ticket(&mut conn, &owner.id, TicketStatus::Closed),
                seed_ticket(&mut conn, &owner.id, TicketStatus::Open),
            )
        };
        let app = build_router(Arc::new(
            TestAppStateBuilder::new().with_pool(pool.clone()).build(),
        ));

        let delete = |ticket_id: i32| {
            let mut request = Request::builder()
                .method("POST")
                .uri(with_id(HubUrls::ADMIN_TICKET_DELETE, ticket_id))
                .body(Body::empty())
                .unwrap();
            request.extensions_mut().insert(signed_in("admin-1", ROLE_ADMIN));
            request
        };

        let response = app.clone().oneshot(delete(closed.id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], HubUrls::ADMIN);
        assert!(find_ticket(&mut pool.get().unwrap(), closed.id).unwrap().is_none());

        let response = app.oneshot(delete(open.id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            json_body(response).await["error"],
            "Only closed tickets can be deleted."
        );
        assert!(find_ticket(&mut pool.get().unwrap(), open.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ticket_detail_hidden_from_other_users() {
        let Some(pool) = live_db_pool() else {
            return;
        };
        let (owner, ticket) = {
            let mut conn = pool.get().unwrap();
            let owner = seed_user(&mut conn, ROLE_USER, None);
            let ticket = seed_ticket(&mut conn, &owner.id, TicketStatus::Open);
            (owner, ticket)
        };
        let app = build_router(Arc::new(
            TestAppStateBuilder::new().with_pool(pool).build(),
        ));
        let view = |ctx: SessionContext| {
            let mut request = Request::builder()
                .uri(with_id(HubUrls::TICKET_BY_ID, ticket.id))
                .body(Body::empty())
                .unwrap();
            request.extensions_mut().insert(ctx);
            request
        };

        let response = app.clone().oneshot(view(signed_in("stranger", ROLE_USER))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.clone().oneshot(view(as_owner(&owner))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&html).contains("Seeded ticket description"));

        let response = app.oneshot(view(signed_in("staff", ROLE_ADMIN))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
