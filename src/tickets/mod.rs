pub mod ui;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

use crate::core::audit::{record_ticket_submission, TicketAuditRecord};
use crate::core::rate_limit::{check_rate_limit, ClientIp, RateLimitPolicy};
use crate::core::shared::models::User;
use crate::core::shared::schema::hub_ticket;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::with_conn;
use crate::core::urls::HubUrls;
use crate::email::{is_valid_email, ticket_notification};
use crate::security::SessionContext;

pub const DESCRIPTION_MIN_CHARS: usize = 10;
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const REASON_PLACEHOLDER: &str = "-";

const CREATE_FAILED: &str = "Failed to create support ticket.";
const PROCESS_FAILED: &str = "Failed to process support ticket.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

impl TicketStatus {
    pub fn all() -> [TicketStatus; 3] {
        [TicketStatus::Open, TicketStatus::InProgress, TicketStatus::Closed]
    }

    pub fn parse(s: &str) -> Option<TicketStatus> {
        match s.trim() {
            "open" => Some(TicketStatus::Open),
            "in_progress" => Some(TicketStatus::InProgress),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "In Progress",
            TicketStatus::Closed => "Closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketReason {
    Abuse,
    AppealOffense,
    Installation,
    BugReport,
    Other,
}

impl TicketReason {
    pub fn all() -> [TicketReason; 5] {
        [
            TicketReason::Abuse,
            TicketReason::AppealOffense,
            TicketReason::Installation,
            TicketReason::BugReport,
            TicketReason::Other,
        ]
    }

    /// Accepts the display label; the `-` placeholder is never a reason.
    pub fn parse(s: &str) -> Option<TicketReason> {
        let s = s.trim();
        Self::all().into_iter().find(|r| r.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketReason::Abuse => "Abuse",
            TicketReason::AppealOffense => "Appeal Offense",
            TicketReason::Installation => "Installation",
            TicketReason::BugReport => "Bug Report",
            TicketReason::Other => "Other",
        }
    }
}

impl fmt::Display for TicketReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = hub_ticket)]
pub struct Ticket {
    pub id: i32,
    pub description: String,
    pub reason: String,
    pub status: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn status(&self) -> Option<TicketStatus> {
        TicketStatus::parse(&self.status)
    }

    pub fn is_closed(&self) -> bool {
        self.status() == Some(TicketStatus::Closed)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = hub_ticket)]
pub struct NewTicket<'a> {
    pub description: &'a str,
    pub reason: &'a str,
    pub status: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitTicketRequest {
    pub reason: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTicket {
    pub reason: TicketReason,
    pub description: String,
}

#[derive(Debug)]
pub enum TicketError {
    Validation(String),
    Unauthorized,
    NotFound,
    NotClosed,
    Internal(&'static str),
}

impl TicketError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::NotClosed => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Unauthorized => "Unauthorized. Please log in.".to_string(),
            Self::NotFound => "Ticket not found.".to_string(),
            Self::NotClosed => "Only closed tickets can be deleted.".to_string(),
            Self::Internal(msg) => msg.to_string(),
        }
    }
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.message() }))).into_response()
    }
}

/// Validate a submission for the signed-in submitter.
pub fn validate_submission(
    name: &str,
    email: &str,
    req: &SubmitTicketRequest,
) -> Result<ValidTicket, TicketError> {
    let reason = req.reason.as_deref().map(str::trim).unwrap_or_default();
    let description = req.description.as_deref().map(str::trim).unwrap_or_default();

    if name.trim().is_empty() || email.trim().is_empty() || reason.is_empty() || description.is_empty() {
        return Err(TicketError::Validation("All fields are required.".to_string()));
    }

    let Some(reason) = TicketReason::parse(reason) else {
        return Err(TicketError::Validation("Please select a reason.".to_string()));
    };

    if !is_valid_email(email.trim()) {
        return Err(TicketError::Validation("Invalid email address.".to_string()));
    }

    let chars = description.chars().count();
    if chars < DESCRIPTION_MIN_CHARS {
        return Err(TicketError::Validation(format!(
            "Description must be at least {} characters long",
            DESCRIPTION_MIN_CHARS
        )));
    }
    if chars > DESCRIPTION_MAX_CHARS {
        return Err(TicketError::Validation(format!(
            "Description must be at most {} characters long",
            DESCRIPTION_MAX_CHARS
        )));
    }

    Ok(ValidTicket {
        reason,
        description: description.to_string(),
    })
}

/// Owners see their own tickets; administrators see everything.
pub fn can_view_ticket(ticket: &Ticket, viewer: &User) -> bool {
    viewer.is_admin() || ticket.user_id == viewer.id
}

pub fn insert_ticket(
    conn: &mut PgConnection,
    user_id: &str,
    ticket: &ValidTicket,
) -> QueryResult<Ticket> {
    diesel::insert_into(hub_ticket::table)
        .values(&NewTicket {
            description: &ticket.description,
            reason: ticket.reason.as_str(),
            status: TicketStatus::Open.as_str(),
            user_id,
        })
        .returning(Ticket::as_returning())
        .get_result(conn)
}

pub fn find_ticket(conn: &mut PgConnection, ticket_id: i32) -> QueryResult<Option<Ticket>> {
    hub_ticket::table
        .find(ticket_id)
        .select(Ticket::as_select())
        .first(conn)
        .optional()
}

pub fn list_user_tickets(conn: &mut PgConnection, user_id: &str) -> QueryResult<Vec<Ticket>> {
    hub_ticket::table
        .filter(hub_ticket::user_id.eq(user_id))
        .order(hub_ticket::updated_at.desc())
        .select(Ticket::as_select())
        .load(conn)
}

pub fn list_all_tickets(conn: &mut PgConnection) -> QueryResult<Vec<Ticket>> {
    hub_ticket::table
        .order(hub_ticket::created_at.desc())
        .select(Ticket::as_select())
        .load(conn)
}

/// Any status may follow any other.
pub fn set_ticket_status(
    conn: &mut PgConnection,
    ticket_id: i32,
    status: TicketStatus,
) -> QueryResult<Option<Ticket>> {
    diesel::update(hub_ticket::table.find(ticket_id))
        .set((
            hub_ticket::status.eq(status.as_str()),
            hub_ticket::updated_at.eq(Utc::now()),
        ))
        .returning(Ticket::as_returning())
        .get_result(conn)
        .optional()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    NotClosed,
}

/// Delete a ticket only once it is closed.
pub fn delete_closed_ticket(conn: &mut PgConnection, ticket_id: i32) -> QueryResult<DeleteOutcome> {
    let deleted = diesel::delete(
        hub_ticket::table
            .filter(hub_ticket::id.eq(ticket_id))
            .filter(hub_ticket::status.eq(TicketStatus::Closed.as_str())),
    )
    .execute(conn)?;

    if deleted > 0 {
        return Ok(DeleteOutcome::Deleted);
    }

    Ok(match find_ticket(conn, ticket_id)? {
        Some(_) => DeleteOutcome::NotClosed,
        None => DeleteOutcome::NotFound,
    })
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new().route(HubUrls::SUBMIT_TICKET, post(submit_ticket))
}

/// `POST /api/submit-ticket`
///
/// The rate limit runs before anything else; every response after it carries
/// the `X-RateLimit-*` headers.
pub async fn submit_ticket(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ctx: SessionContext,
    body: Bytes,
) -> Response {
    let policy = RateLimitPolicy::submit_ticket(state.config.env);
    let limit = match check_rate_limit(state.rate_limiter.as_ref(), &ip, &policy).await {
        Ok(limit) => limit,
        Err(e) => {
            error!("Error processing support ticket: {}", e);
            return TicketError::Internal(PROCESS_FAILED).into_response();
        }
    };

    if !limit.success {
        return limit.too_many_requests(Utc::now().timestamp_millis());
    }

    limit.with_headers(process_submission(&state, &ip, &ctx, &body).await)
}

async fn process_submission(
    state: &AppState,
    ip: &str,
    ctx: &SessionContext,
    body: &[u8],
) -> Result<Json<serde_json::Value>, TicketError> {
    let current = ctx.require().map_err(|_| TicketError::Unauthorized)?;
    let user = &current.user;

    let req: SubmitTicketRequest = serde_json::from_slice(body)
        .map_err(|_| TicketError::Validation("Invalid request body.".to_string()))?;
    let valid = validate_submission(&user.name, &user.email, &req)?;

    let user_id = user.id.clone();
    let to_insert = valid.clone();
    let ticket = with_conn(&state.conn, move |conn| insert_ticket(conn, &user_id, &to_insert))
        .await
        .map_err(|e| {
            error!("Failed to insert ticket: {}", e);
            TicketError::Internal(CREATE_FAILED)
        })?;

    let notification = ticket_notification(
        state.mailer.support_inbox(),
        &user.name,
        &user.email,
        valid.reason.as_str(),
        &valid.description,
    );
    if let Err(e) = state.mailer.send(notification).await {
        warn!("Ticket {} saved but notification email failed: {:#}", ticket.id, e);
    }

    let record = TicketAuditRecord {
        created_at: Utc::now(),
        description: valid.description.clone(),
        email: user.email.clone(),
        ip: ip.to_string(),
        name: user.name.clone(),
        reason: valid.reason.as_str().to_string(),
    };
    if let Err(e) = record_ticket_submission(&state.cache, &record).await {
        warn!("Ticket {} saved but audit record failed: {}", ticket.id, e);
    }

    info!("Ticket {} submitted by {} ({})", ticket.id, user.id, valid.reason);
    Ok(Json(json!({
        "success": true,
        "message": "Ticket submitted.",
        "id": ticket.id
    })))
}
