use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn is_development(self) -> bool {
        self == AppEnv::Development
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppEnv::Development => write!(f, "development"),
            AppEnv::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub env: AppEnv,
    pub server: ServerConfig,
    pub database_url: String,
    pub redis_url: String,
    pub discord: DiscordConfig,
    pub email: EmailConfig,
    pub admin_emails: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub api_key: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub from: String,
    pub support_inbox: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| value(key).ok_or(ConfigError::Missing(key));
        let get_str = |key: &str, default: &str| value(key).unwrap_or_else(|| default.to_string());
        let get_u16 = |key: &'static str, default: u16| -> Result<u16, ConfigError> {
            match value(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid { key, value: raw }),
                None => Ok(default),
            }
        };

        let env = match value("APP_ENV").as_deref().map(str::trim) {
            None | Some("development") => AppEnv::Development,
            Some("production") => AppEnv::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "APP_ENV",
                    value: other.to_string(),
                })
            }
        };

        let base_url = required("BASE_URL")?.trim_end_matches('/').to_string();

        Ok(AppConfig {
            env,
            server: ServerConfig {
                host: get_str("SERVER_HOST", "0.0.0.0"),
                port: get_u16("SERVER_PORT", 3000)?,
                base_url,
            },
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            discord: DiscordConfig {
                client_id: required("DISCORD_CLIENT_ID")?,
                client_secret: required("DISCORD_CLIENT_SECRET")?,
            },
            email: EmailConfig {
                api_key: required("EMAIL_API_KEY")?,
                smtp_host: get_str("SMTP_HOST", "smtp.resend.com"),
                smtp_port: get_u16("SMTP_PORT", 465)?,
                smtp_user: get_str("SMTP_USER", "resend"),
                from: get_str("EMAIL_FROM", "tickets@lx2.dev"),
                support_inbox: get_str("SUPPORT_INBOX", "lasse@lx2.dev"),
            },
            admin_emails: parse_email_list(&get_str("ADMIN_EMAILS", "")),
        })
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
