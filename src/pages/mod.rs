//! Landing page, dashboard and the shared page chrome.

use std::sync::Arc;

use axum::{
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};

use crate::core::shared::state::AppState;
use crate::core::shared::utils::html_escape;
use crate::core::urls::HubUrls;
use crate::security::{CurrentSession, SessionContext};

pub const SITE_NAME: &str = "Lx2 Hub";
const LOGO_URL: &str = "https://create.lx2.dev/android-chrome-512x512.png";

const STYLES: &str = "\
body{margin:0;font-family:system-ui,sans-serif;background:#0b0b0f;color:#e4e4e7}\
a{color:#a78bfa}\
.nav{display:flex;align-items:center;gap:1.5rem;padding:0 2rem;height:4rem;border-bottom:1px solid #27272a}\
.nav a{color:#a1a1aa;text-decoration:none}.nav a.active{color:#fafafa;border-bottom:2px solid #a78bfa}\
.nav .spacer{flex:1}\
.avatar{width:2rem;height:2rem;border-radius:50%;display:inline-flex;align-items:center;justify-content:center;background:#3f3f46}\
main{max-width:72rem;margin:2rem auto;padding:0 1rem}\
.card{border:1px solid #27272a;border-radius:.75rem;padding:1.5rem;margin-bottom:1.5rem;background:#111114}\
.muted{color:#a1a1aa}\
table{width:100%;border-collapse:collapse}th,td{text-align:left;padding:.5rem;border-bottom:1px solid #27272a}\
.badge{display:inline-block;padding:.1rem .5rem;border-radius:.4rem;border:1px solid;font-size:.8rem}\
.badge-open{border-color:#22c55e80;background:#22c55e33}\
.badge-in-progress{border-color:#eab30880;background:#eab30833}\
.badge-closed{border-color:#3b82f680;background:#3b82f633}\
.badge-danger{border-color:#ef444480;background:#ef444433}\
button,.btn{background:#7c3aed;color:#fff;border:0;border-radius:.4rem;padding:.4rem .8rem;cursor:pointer}\
button:disabled{opacity:.4;cursor:not-allowed}\
input,select,textarea{background:#18181b;color:#e4e4e7;border:1px solid #3f3f46;border-radius:.4rem;padding:.4rem;width:100%;box-sizing:border-box}\
.inline{display:inline}.error{color:#f87171}.success{color:#4ade80}";

/// Page wrapper with the signed-in navigation bar.
pub fn render_layout(title: &str, current: Option<&CurrentSession>, active: &str, body: &str) -> Html<String> {
    let nav = match current {
        Some(current) => render_nav(current, active),
        None => String::new(),
    };
    Html(format!(
        "<!DOCTYPE html>\
<html lang=\"en\">\
<head>\
<meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>{title} | {site}</title>\
<style>{styles}</style>\
</head>\
<body>{nav}<main>{body}</main></body>\
</html>",
        title = html_escape(title),
        site = SITE_NAME,
        styles = STYLES,
        nav = nav,
        body = body,
    ))
}

fn render_nav(current: &CurrentSession, active: &str) -> String {
    let mut links = vec![(HubUrls::DASHBOARD, "Dashboard"), (HubUrls::TICKETS, "Tickets")];
    if current.is_admin() {
        links.push((HubUrls::ADMIN, "Admin"));
    }
    links.push((HubUrls::PROFILE, "Profile"));

    let links = links
        .iter()
        .map(|(href, label)| {
            let class = if *href == active { " class=\"active\"" } else { "" };
            format!("<a href=\"{}\"{}>{}</a>", href, class, label)
        })
        .collect::<String>();

    format!(
        "<nav class=\"nav\">\
            <a href=\"{home}\"><img src=\"{logo}\" alt=\"Logo\" width=\"32\" height=\"32\"></a>\
            {links}\
            <span class=\"spacer\"></span>\
            {avatar}\
            <span class=\"muted\">{name}</span>\
            <form class=\"inline\" method=\"post\" action=\"{logout}\"><button type=\"submit\">Logout</button></form>\
        </nav>",
        home = HubUrls::HOME,
        logo = LOGO_URL,
        links = links,
        avatar = render_avatar(current),
        name = html_escape(&current.user.name),
        logout = HubUrls::LOGOUT,
    )
}

pub fn render_avatar(current: &CurrentSession) -> String {
    match &current.user.image {
        Some(image) => format!(
            "<img class=\"avatar\" src=\"{}\" alt=\"{}\">",
            html_escape(image),
            html_escape(&current.user.name)
        ),
        None => format!("<span class=\"avatar\">{}</span>", current.user.initial()),
    }
}

pub fn configure_pages_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(HubUrls::HOME, get(landing_page))
        .route(HubUrls::DASHBOARD, get(dashboard_page))
}

pub async fn landing_page(ctx: SessionContext) -> Html<String> {
    let action = if ctx.is_authenticated() {
        format!("<a class=\"btn\" href=\"{}\">Dashboard</a>", HubUrls::DASHBOARD)
    } else {
        format!("<a class=\"btn\" href=\"{}\">Login / Register</a>", HubUrls::LOGIN)
    };

    let body = format!(
        "<header style=\"display:flex;justify-content:space-between;align-items:center;padding:2.5rem 0\">\
            <img src=\"{logo}\" alt=\"Logo\" width=\"100\" height=\"100\">\
            <nav>{action}</nav>\
        </header>\
        <footer class=\"muted\" style=\"text-align:center;padding:4rem 0\">{site}</footer>",
        logo = LOGO_URL,
        action = action,
        site = SITE_NAME,
    );
    render_layout("Home", None, HubUrls::HOME, &body)
}

pub async fn dashboard_page(ctx: SessionContext) -> Response {
    let current = match ctx.require_page() {
        Ok(current) => current,
        Err(redirect) => return redirect.into_response(),
    };

    let body = "<div class=\"card\">\
        <h1>Welcome to the Lx2 Hub</h1>\
        <p class=\"muted\">Lx2 Hub is a centralized platform for support-oriented inquiries \
        regarding Lx2 community services, including the Lx2 Discord server, Lx2 websites, \
        and public GitHub repositories. We'll do our best to respond to you as quickly as possible!</p>\
    </div>";
    render_layout("Dashboard", Some(current), HubUrls::DASHBOARD, body).into_response()
}
