//! Discord OAuth2 endpoints, token exchange and profile lookup.

use super::{OAuthConfig, OAuthTokenResponse, OAuthUserInfo};
use crate::core::config::AppConfig;
use crate::core::urls::HubUrls;
use anyhow::{anyhow, Result};
use reqwest::Client;

pub const DISCORD_API_BASE: &str = "https://discord.com";
const DISCORD_CDN: &str = "https://cdn.discordapp.com";
const SCOPES: &[&str] = &["identify", "email"];

#[derive(Debug, Clone)]
pub struct DiscordEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl DiscordEndpoints {
    pub fn with_api_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{}/api/oauth2/authorize", base),
            token_url: format!("{}/api/oauth2/token", base),
            userinfo_url: format!("{}/api/users/@me", base),
        }
    }
}

impl Default for DiscordEndpoints {
    fn default() -> Self {
        Self::with_api_base(DISCORD_API_BASE)
    }
}

#[derive(Debug, Clone)]
pub struct DiscordProvider {
    pub config: OAuthConfig,
    pub endpoints: DiscordEndpoints,
}

impl DiscordProvider {
    pub fn new(config: OAuthConfig, endpoints: DiscordEndpoints) -> Self {
        Self { config, endpoints }
    }

    pub fn from_app_config(app: &AppConfig) -> Self {
        Self::new(
            OAuthConfig {
                client_id: app.discord.client_id.clone(),
                client_secret: app.discord.client_secret.clone(),
                redirect_uri: format!("{}{}", app.server.base_url, HubUrls::DISCORD_CALLBACK),
            },
            DiscordEndpoints::default(),
        )
    }

    /// Build the authorization URL the browser is sent to
    pub fn build_auth_url(&self, state: &str) -> String {
        let scope = SCOPES.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
            ("prompt", "none"),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.endpoints.auth_url, query)
    }

    /// Exchange authorization code for access token
    pub async fn exchange_code(&self, code: &str, client: &Client) -> Result<OAuthTokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = client
            .post(&self.endpoints.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&params)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to exchange code: {}", e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Token exchange failed: {}", error_text));
        }

        response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse token response: {}", e))
    }

    /// Fetch the signed-in Discord user
    pub async fn fetch_user_info(&self, access_token: &str, client: &Client) -> Result<OAuthUserInfo> {
        let response = client
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch user info: {}", e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to fetch user info: {}", error_text));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse user info: {}", e))?;

        parse_user_info(&raw)
    }
}

pub fn parse_user_info(raw: &serde_json::Value) -> Result<OAuthUserInfo> {
    let id = raw["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("Discord user response has no id"))?;

    let name = raw["global_name"]
        .as_str()
        .or_else(|| raw["username"].as_str())
        .map(String::from);

    Ok(OAuthUserInfo {
        provider_id: id.to_string(),
        email: raw["email"].as_str().map(|e| e.trim().to_lowercase()),
        email_verified: raw["verified"].as_bool().unwrap_or(false),
        name,
        avatar_url: raw["avatar"]
            .as_str()
            .map(|avatar| format!("{}/avatars/{}/{}.png", DISCORD_CDN, id, avatar)),
    })
}
