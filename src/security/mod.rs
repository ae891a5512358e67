pub mod auth_api;
pub mod headers;

pub use auth_api::{session_middleware, AuthError, CurrentSession, SessionContext};
pub use headers::security_headers_middleware;
