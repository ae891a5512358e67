//! Session-based authentication for pages and JSON endpoints.

pub mod error;
pub mod middleware;
pub mod types;

pub use error::AuthError;
pub use middleware::session_middleware;
pub use types::{CurrentSession, SessionContext};
