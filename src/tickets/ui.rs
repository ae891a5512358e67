use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use log::error;
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::shared::utils::{html_escape, with_conn};
use crate::core::urls::{with_id, HubUrls};
use crate::pages::render_layout;
use crate::security::{CurrentSession, SessionContext};
use crate::tickets::{
    can_view_ticket, find_ticket, list_user_tickets, Ticket, TicketReason, TicketStatus,
    DESCRIPTION_MAX_CHARS, DESCRIPTION_MIN_CHARS, REASON_PLACEHOLDER,
};

pub fn status_badge(status: &str) -> String {
    match TicketStatus::parse(status) {
        Some(TicketStatus::Open) => "<span class=\"badge badge-open\">Open</span>".to_string(),
        Some(TicketStatus::InProgress) => {
            "<span class=\"badge badge-in-progress\">In Progress</span>".to_string()
        }
        Some(TicketStatus::Closed) => "<span class=\"badge badge-closed\">Closed</span>".to_string(),
        None => format!("<span class=\"badge\">{}</span>", html_escape(status)),
    }
}

pub fn render_empty_state(title: &str, description: &str) -> String {
    format!(
        "<div class=\"empty-state\">\
            <h3>{}</h3>\
            <p class=\"muted\">{}</p>\
        </div>",
        html_escape(title),
        html_escape(description)
    )
}

pub fn error_page(status: StatusCode, current: Option<&CurrentSession>, message: &str) -> Response {
    let body = format!(
        "<div class=\"card\"><h1>{}</h1><p class=\"muted\">{}</p></div>",
        status.as_u16(),
        html_escape(message)
    );
    (status, render_layout("Error", current, "", &body)).into_response()
}

pub fn ticket_count_line(count: usize) -> String {
    if count > 0 {
        format!("You have {} tickets created.", count)
    } else {
        "You haven't created any tickets yet!".to_string()
    }
}

fn render_ticket_row(ticket: &Ticket) -> String {
    format!(
        "<tr>\
            <td>{status}</td>\
            <td>{reason}</td>\
            <td>{description}</td>\
            <td style=\"text-align:right\"><a href=\"{href}\">Details &rarr;</a></td>\
        </tr>",
        status = status_badge(&ticket.status),
        reason = html_escape(&ticket.reason),
        description = html_escape(&ticket.description),
        href = with_id(HubUrls::TICKET_BY_ID, ticket.id),
    )
}

pub fn render_ticket_form() -> String {
    let options = std::iter::once(format!(
        "<option value=\"{0}\" selected>{0}</option>",
        REASON_PLACEHOLDER
    ))
    .chain(
        TicketReason::all()
            .iter()
            .map(|r| format!("<option value=\"{0}\">{0}</option>", r.as_str())),
    )
    .collect::<String>();

    format!(
        r#"<form id="ticket-form">
    <label for="reason">Reason</label>
    <select id="reason" name="reason">{options}</select>
    <label for="description">Description</label>
    <textarea id="description" name="description" rows="6" minlength="{min}" maxlength="{max}" required></textarea>
    <p class="muted"><span id="char-count">0</span>/{max} characters</p>
    <p id="form-message"></p>
    <button type="submit">Submit</button>
</form>
<script>
(function () {{
  var form = document.getElementById("ticket-form");
  var description = document.getElementById("description");
  var counter = document.getElementById("char-count");
  var message = document.getElementById("form-message");
  description.addEventListener("input", function () {{ counter.textContent = description.value.length; }});
  form.addEventListener("submit", async function (event) {{
    event.preventDefault();
    var button = form.querySelector("button");
    button.disabled = true;
    try {{
      var res = await fetch("{endpoint}", {{
        method: "POST",
        headers: {{ "Content-Type": "application/json" }},
        body: JSON.stringify({{ reason: form.reason.value, description: description.value }})
      }});
      var data = await res.json();
      if (res.status === 429) {{
        message.className = "error";
        message.textContent = "You are submitting tickets too quickly. Please try again later.";
      }} else if (!res.ok) {{
        message.className = "error";
        message.textContent = data.error || "Something went wrong";
      }} else {{
        window.location.reload();
      }}
    }} catch (e) {{
      message.className = "error";
      message.textContent = "An unexpected error occurred. Please try again later.";
    }} finally {{
      button.disabled = false;
    }}
  }});
}})();
</script>"#,
        options = options,
        min = DESCRIPTION_MIN_CHARS,
        max = DESCRIPTION_MAX_CHARS,
        endpoint = HubUrls::SUBMIT_TICKET,
    )
}

pub fn render_tickets_page(current: &CurrentSession, tickets: &[Ticket]) -> String {
    let list = if tickets.is_empty() {
        String::new()
    } else {
        format!(
            "<table>\
                <thead><tr><th>Status</th><th>Reason</th><th>Description</th><th></th></tr></thead>\
                <tbody>{}</tbody>\
            </table>",
            tickets.iter().map(render_ticket_row).collect::<String>()
        )
    };

    let body = format!(
        "<div class=\"card\">\
            <h1>Existing Tickets</h1>\
            <p class=\"muted\">{count}</p>\
            {list}\
        </div>\
        <div class=\"card\">\
            <h2>New Ticket</h2>\
            <p class=\"muted\">Describe your issue in detail.</p>\
            {form}\
        </div>",
        count = ticket_count_line(tickets.len()),
        list = list,
        form = render_ticket_form(),
    );
    render_layout("Tickets", Some(current), HubUrls::TICKETS, &body).0
}

/// Admin status picker. `return_to` is where the update redirects afterwards.
pub fn render_status_select(ticket: &Ticket, return_to: &str) -> String {
    let options = TicketStatus::all()
        .iter()
        .map(|s| {
            let selected = if s.as_str() == ticket.status { " selected" } else { "" };
            format!("<option value=\"{}\"{}>{}</option>", s.as_str(), selected, s.label())
        })
        .collect::<String>();

    format!(
        "<form class=\"inline\" method=\"post\" action=\"{action}\">\
            <input type=\"hidden\" name=\"return_to\" value=\"{return_to}\">\
            <select name=\"status\" onchange=\"this.form.submit()\">{options}</select>\
            <noscript><button type=\"submit\">Update</button></noscript>\
        </form>",
        action = with_id(HubUrls::ADMIN_TICKET_STATUS, ticket.id),
        return_to = html_escape(return_to),
        options = options,
    )
}

pub fn render_ticket_detail(current: &CurrentSession, ticket: &Ticket) -> String {
    let status = if current.is_admin() {
        render_status_select(ticket, &with_id(HubUrls::TICKET_BY_ID, ticket.id))
    } else {
        status_badge(&ticket.status)
    };

    let body = format!(
        "<div class=\"card\">\
            <p><a href=\"{back}\">&larr; Back to tickets</a></p>\
            <h1>Ticket #{id}</h1>\
            <table>\
                <tr><th>Status</th><td>{status}</td></tr>\
                <tr><th>Reason</th><td>{reason}</td></tr>\
                <tr><th>Created</th><td>{created}</td></tr>\
                <tr><th>Last updated</th><td>{updated}</td></tr>\
            </table>\
            <h2>Description</h2>\
            <p style=\"white-space:pre-wrap\">{description}</p>\
        </div>",
        back = HubUrls::TICKETS,
        id = ticket.id,
        status = status,
        reason = html_escape(&ticket.reason),
        created = ticket.created_at.format("%Y-%m-%d %H:%M UTC"),
        updated = ticket.updated_at.format("%Y-%m-%d %H:%M UTC"),
        description = html_escape(&ticket.description),
    );
    render_layout(&format!("Ticket #{}", ticket.id), Some(current), HubUrls::TICKETS, &body).0
}

pub fn configure_tickets_ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(HubUrls::TICKETS, get(handle_tickets_page))
        .route(HubUrls::TICKET_BY_ID, get(handle_ticket_detail))
}

async fn handle_tickets_page(State(state): State<Arc<AppState>>, ctx: SessionContext) -> Response {
    let current = match ctx.require_page() {
        Ok(current) => current,
        Err(redirect) => return redirect.into_response(),
    };

    let user_id = current.user.id.clone();
    match with_conn(&state.conn, move |conn| list_user_tickets(conn, &user_id)).await {
        Ok(tickets) => axum::response::Html(render_tickets_page(current, &tickets)).into_response(),
        Err(e) => {
            error!("Failed to load tickets: {}", e);
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(current),
                "Unable to load tickets",
            )
        }
    }
}

async fn handle_ticket_detail(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Path(id): Path<String>,
) -> Response {
    let current = match ctx.require_page() {
        Ok(current) => current,
        Err(redirect) => return redirect.into_response(),
    };

    let Ok(ticket_id) = id.parse::<i32>() else {
        return error_page(StatusCode::NOT_FOUND, Some(current), "Ticket not found.");
    };

    match with_conn(&state.conn, move |conn| find_ticket(conn, ticket_id)).await {
        Ok(Some(ticket)) if can_view_ticket(&ticket, &current.user) => {
            axum::response::Html(render_ticket_detail(current, &ticket)).into_response()
        }
        // Other users' tickets are indistinguishable from missing ones.
        Ok(_) => error_page(StatusCode::NOT_FOUND, Some(current), "Ticket not found."),
        Err(e) => {
            error!("Failed to load ticket {}: {}", ticket_id, e);
            error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(current),
                "Unable to load ticket",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::models::ROLE_ADMIN;
    use crate::core::shared::test_utils::{signed_in, signed_in_user};
    use chrono::Utc;

    fn ticket(status: &str) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: 3,
            description: "Cannot <install> the app".to_string(),
            reason: "Installation".to_string(),
            status: status.to_string(),
            user_id: "user-1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_ticket_count_line() {
        assert_eq!(ticket_count_line(0), "You haven't created any tickets yet!");
        assert_eq!(ticket_count_line(3), "You have 3 tickets created.");
    }

    #[test]
    fn test_status_badge() {
        assert!(status_badge("in_progress").contains("In Progress"));
        assert!(status_badge("<b>").contains("&lt;b&gt;"));
    }

    #[test]
    fn test_ticket_form_lists_reasons() {
        let form = render_ticket_form();
        assert!(form.contains("<option value=\"-\" selected>-</option>"));
        assert!(form.contains("<option value=\"Appeal Offense\">Appeal Offense</option>"));
        assert!(form.contains("/api/submit-ticket"));
    }

    #[test]
    fn test_tickets_page_escapes_rows() {
        let ctx = signed_in_user();
        let current = ctx.current().unwrap();
        let page = render_tickets_page(current, &[ticket("open")]);
        assert!(page.contains("You have 1 tickets created."));
        assert!(page.contains("Cannot &lt;install&gt; the app"));
        assert!(page.contains("href=\"/tickets/3\""));
    }

    #[test]
    fn test_detail_status_select_for_admin_only() {
        let user = signed_in_user();
        let page = render_ticket_detail(user.current().unwrap(), &ticket("closed"));
        assert!(!page.contains("<select name=\"status\""));

        let admin = signed_in("admin-1", ROLE_ADMIN);
        let page = render_ticket_detail(admin.current().unwrap(), &ticket("closed"));
        assert!(page.contains("action=\"/admin/tickets/3/status\""));
        assert!(page.contains("<option value=\"closed\" selected>Closed</option>"));
        assert!(page.contains("name=\"return_to\" value=\"/tickets/3\""));
    }
}
