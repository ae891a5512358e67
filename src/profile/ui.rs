use crate::core::shared::models::Session;
use crate::core::shared::utils::html_escape;
use crate::core::urls::HubUrls;
use crate::pages::{render_avatar, render_layout};
use crate::security::CurrentSession;

use super::{describe_user_agent, Notice};

fn render_session_row(session: &Session) -> String {
    format!(
        "<li>\
            <strong>{device}</strong>\
            <div class=\"muted\">{ip} &middot; last active {active}</div>\
        </li>",
        device = html_escape(&describe_user_agent(session.user_agent.as_deref())),
        ip = html_escape(session.ip_address.as_deref().unwrap_or("Unknown IP")),
        active = session.updated_at.format("%Y-%m-%d %H:%M UTC"),
    )
}

pub fn render_profile_page(
    current: &CurrentSession,
    other_sessions: &[Session],
    notice: Option<Notice>,
    error: Option<&str>,
) -> String {
    let banner = match (notice, error) {
        (_, Some(error)) => format!("<p class=\"error\">{}</p>", html_escape(error)),
        (Some(notice), None) => format!("<p class=\"success\">{}</p>", notice.message()),
        (None, None) => String::new(),
    };

    let sessions = if other_sessions.is_empty() {
        "<p class=\"muted\">No other active browser sessions.</p>".to_string()
    } else {
        format!(
            "<ul>{}</ul>\
            <form method=\"post\" action=\"{}\" \
                onsubmit=\"return confirm('Are you sure you would like to log out of your other browser sessions across all of your devices?')\">\
                <button type=\"submit\">Log out other browser sessions</button>\
            </form>",
            other_sessions.iter().map(render_session_row).collect::<String>(),
            HubUrls::PROFILE_REVOKE_OTHERS
        )
    };

    let body = format!(
        "{banner}\
        <div class=\"card\">\
            <h1>Profile</h1>\
            <form method=\"post\" action=\"{action}\">\
                <label>Avatar</label>\
                <div style=\"margin:.5rem 0 1rem\">{avatar}</div>\
                <label for=\"name\">Name</label>\
                <input id=\"name\" name=\"name\" value=\"{name}\" required>\
                <label for=\"email\">Email</label>\
                <input id=\"email\" name=\"email\" type=\"email\" value=\"{email}\" required>\
                <p><button type=\"submit\">Save</button></p>\
            </form>\
        </div>\
        <div class=\"card\">\
            <h2>Browser Sessions</h2>\
            <p class=\"muted\">If necessary, you may log out of all of your other browser sessions \
            across all of your devices. Some of your recent sessions are listed below.</p>\
            {sessions}\
        </div>",
        banner = banner,
        action = HubUrls::PROFILE,
        avatar = render_avatar(current),
        name = html_escape(&current.user.name),
        email = html_escape(&current.user.email),
        sessions = sessions,
    );
    render_layout("Profile", Some(current), HubUrls::PROFILE, &body).0
}
