use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub enum AuthError {
    MissingSession,
    AdminRequired,
    AccountBanned,
    InternalError(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSession => StatusCode::UNAUTHORIZED,
            Self::AdminRequired => StatusCode::UNAUTHORIZED,
            Self::AccountBanned => StatusCode::FORBIDDEN,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingSession => "missing_session",
            Self::AdminRequired => "admin_required",
            Self::AccountBanned => "account_banned",
            Self::InternalError(_) => "internal_error",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingSession => "Unauthorized. Please log in.",
            Self::AdminRequired => "Unauthorized. Administrator access required.",
            Self::AccountBanned => "Your account has been banned.",
            Self::InternalError(_) => "An internal error occurred",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InternalError(detail) => write!(f, "{}: {}", self.error_code(), detail),
            _ => write!(f, "{}", self.error_code()),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::InternalError(detail) = &self {
            log::error!("Auth internal error: {}", detail);
        }
        let status = self.status_code();
        let body = Json(json!({
            "error": self.message(),
            "code": self.error_code()
        }));
        (status, body).into_response()
    }
}
