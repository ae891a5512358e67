use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use supporthub::core::config::AppConfig;
use supporthub::core::oauth::DiscordProvider;
use supporthub::core::rate_limit::RedisWindowCounter;
use supporthub::core::shared::state::AppState;
use supporthub::core::shared::utils::{create_conn, run_migrations};
use supporthub::email::SmtpMailer;
use supporthub::main_module::run_server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Starting {} in {} mode", env!("CARGO_PKG_NAME"), config.env);

    let pool = match create_conn(&config.database_url) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };
    let migration_pool = pool.clone();
    match tokio::task::spawn_blocking(move || run_migrations(&migration_pool)).await {
        Ok(Ok(())) => info!("Database migrations applied"),
        Ok(Err(e)) => {
            error!("Failed to run migrations: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Migration task failed: {}", e);
            std::process::exit(1);
        }
    }

    let cache = match redis::Client::open(config.redis_url.as_str()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Invalid REDIS_URL: {}", e);
            std::process::exit(1);
        }
    };

    let mailer = match SmtpMailer::from_config(&config.email) {
        Ok(mailer) => mailer,
        Err(e) => {
            error!("Failed to configure SMTP transport: {:#}", e);
            std::process::exit(1);
        }
    };

    let discord = DiscordProvider::from_app_config(&config);
    if !discord.config.is_valid() {
        error!("Discord OAuth is not configured; sign-in will be unavailable");
    }

    let state = Arc::new(AppState {
        conn: pool,
        rate_limiter: Arc::new(RedisWindowCounter::new(cache.clone())),
        cache,
        mailer: Arc::new(mailer),
        discord,
        http_client: reqwest::Client::new(),
        config,
    });

    run_server(state).await
}
