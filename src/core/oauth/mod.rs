//! OAuth2 sign-in with Discord.

pub mod providers;
pub mod routes;

use serde::{Deserialize, Serialize};

pub use providers::{DiscordEndpoints, DiscordProvider};

pub const PROVIDER_ID: &str = "discord";

/// State older than this is rejected at the callback.
pub const STATE_TTL_SECS: i64 = 600;

/// OAuth client credentials
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl OAuthConfig {
    pub fn is_valid(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.redirect_uri.is_empty()
    }
}

/// User information returned from Discord
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthUserInfo {
    pub provider_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// State parameter for the OAuth flow. The token is mirrored in a short-lived
/// cookie and compared at the callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthState {
    pub token: String,
    pub redirect_after: Option<String>,
    pub created_at: i64,
}

impl OAuthState {
    pub fn new(redirect_after: Option<String>) -> Self {
        Self {
            token: crate::core::shared::utils::generate_token(),
            redirect_after: redirect_after.filter(|r| is_local_redirect(r)),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now - self.created_at > STATE_TTL_SECS
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    /// Encode state to URL-safe string
    pub fn encode(&self) -> String {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        let json = serde_json::to_string(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    /// Decode state from URL-safe string
    pub fn decode(encoded: &str) -> Option<Self> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        let json = String::from_utf8(bytes).ok()?;
        serde_json::from_str(&json).ok()
    }
}

/// Only same-site paths are honoured after sign-in.
pub fn is_local_redirect(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}
