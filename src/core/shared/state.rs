use crate::core::config::AppConfig;
use crate::core::oauth::DiscordProvider;
use crate::core::rate_limit::WindowCounter;
use crate::email::Mailer;
use crate::core::shared::utils::DbPool;
use redis::Client as RedisClient;
use std::sync::Arc;

pub struct AppState {
    pub conn: DbPool,
    pub cache: Arc<RedisClient>,
    pub config: AppConfig,
    pub rate_limiter: Arc<dyn WindowCounter>,
    pub mailer: Arc<dyn Mailer>,
    pub discord: DiscordProvider,
    pub http_client: reqwest::Client,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conn", &"DbPool")
            .field("cache", &"RedisClient")
            .field("env", &self.config.env)
            .field("discord", &self.discord.endpoints)
            .finish_non_exhaustive()
    }
}
