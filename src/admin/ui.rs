use crate::core::shared::models::User;
use crate::core::shared::utils::html_escape;
use crate::core::urls::{with_id, HubUrls};
use crate::pages::render_layout;
use crate::security::CurrentSession;
use crate::tickets::ui::{render_empty_state, render_status_select};
use crate::tickets::Ticket;

use super::BAN_REASON_MIN_CHARS;

const DATE_FORMAT: &str = "%b %d, %Y";

fn render_admin_ticket_row(ticket: &Ticket) -> String {
    let disabled = if ticket.is_closed() { "" } else { " disabled title=\"Close the ticket first\"" };
    format!(
        "<tr>\
            <td>{status}</td>\
            <td>{reason}</td>\
            <td>{description}</td>\
            <td>{created}</td>\
            <td style=\"text-align:right\">\
                <a href=\"{href}\">Details</a> \
                <form class=\"inline\" method=\"post\" action=\"{delete}\" \
                    onsubmit=\"return confirm('This action cannot be undone. This will permanently delete the ticket.')\">\
                    <button type=\"submit\"{disabled}>Delete</button>\
                </form>\
            </td>\
        </tr>",
        status = render_status_select(ticket, HubUrls::ADMIN),
        reason = html_escape(&ticket.reason),
        description = html_escape(&ticket.description),
        created = ticket.created_at.format(DATE_FORMAT),
        href = with_id(HubUrls::TICKET_BY_ID, ticket.id),
        delete = with_id(HubUrls::ADMIN_TICKET_DELETE, ticket.id),
        disabled = disabled,
    )
}

fn render_user_actions(user: &User, current: &CurrentSession) -> String {
    if user.id == current.user.id {
        return String::new();
    }
    if user.banned {
        return format!(
            "<form class=\"inline\" method=\"post\" action=\"{}\"><button type=\"submit\">Unban</button></form>",
            with_id(HubUrls::ADMIN_USER_UNBAN, &user.id)
        );
    }
    format!(
        "<form method=\"post\" action=\"{action}\">\
            <input name=\"reason\" placeholder=\"Reason\" minlength=\"{min}\" required>\
            <input name=\"duration\" placeholder=\"Days (empty = permanent)\" inputmode=\"numeric\">\
            <button type=\"submit\">Ban</button>\
        </form>",
        action = with_id(HubUrls::ADMIN_USER_BAN, &user.id),
        min = BAN_REASON_MIN_CHARS,
    )
}

fn render_user_row(user: &User, current: &CurrentSession) -> String {
    let banned = if user.banned {
        let reason = user.ban_reason.as_deref().map(html_escape).unwrap_or_default();
        format!("<span class=\"badge badge-danger\" title=\"{}\">Banned</span>", reason)
    } else {
        "<span class=\"muted\">No</span>".to_string()
    };
    let verified = if user.email_verified { "Yes" } else { "No" };

    format!(
        "<tr>\
            <td>{banned}</td>\
            <td>{verified}</td>\
            <td>{email}</td>\
            <td>{name}</td>\
            <td style=\"text-align:right\">{created}</td>\
            <td style=\"text-align:right\">{actions}</td>\
        </tr>",
        banned = banned,
        verified = verified,
        email = html_escape(&user.email),
        name = html_escape(&user.name),
        created = user.created_at.format(DATE_FORMAT),
        actions = render_user_actions(user, current),
    )
}

pub fn render_admin_page(current: &CurrentSession, tickets: &[Ticket], users: &[User]) -> String {
    let tickets_table = if tickets.is_empty() {
        render_empty_state("No tickets", "Nobody has filed a ticket yet.")
    } else {
        format!(
            "<table>\
                <thead><tr><th>Status</th><th>Reason</th><th>Description</th><th>Created</th><th></th></tr></thead>\
                <tbody>{}</tbody>\
            </table>",
            tickets.iter().map(render_admin_ticket_row).collect::<String>()
        )
    };

    let users_table = format!(
        "<table>\
            <thead><tr><th>Banned</th><th>Email Verified</th><th>Email</th><th>Name</th>\
            <th style=\"text-align:right\">Created At</th><th></th></tr></thead>\
            <tbody>{}</tbody>\
        </table>",
        users
            .iter()
            .map(|u| render_user_row(u, current))
            .collect::<String>()
    );

    let body = format!(
        "<div class=\"card\">\
            <h1>Tickets</h1>\
            <p class=\"muted\">{ticket_count} total</p>\
            {tickets_table}\
        </div>\
        <div class=\"card\">\
            <h1>Users</h1>\
            <p class=\"muted\">{user_count} total</p>\
            {users_table}\
        </div>",
        ticket_count = tickets.len(),
        tickets_table = tickets_table,
        user_count = users.len(),
        users_table = users_table,
    );
    render_layout("Admin", Some(current), HubUrls::ADMIN, &body).0
}
