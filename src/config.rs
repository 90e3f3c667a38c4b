use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_days: i64,
    pub cookie_secure: bool,
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub session_data_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: Option<String>,
    pub max_connections: u32,
    pub cors_origins: Vec<String>,
    pub session: SessionConfig,
    pub chat: ChatConfig,
    pub identity: IdentityConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let database_name = non_empty_var("DB_NAME");
        let max_connections = parsed_var("DATABASE_MAX_CONNECTIONS").unwrap_or(10);
        let cors_origins =
            parse_origins(&std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".into()));

        let session = SessionConfig {
            ttl_days: parsed_var("SESSION_TTL_DAYS").unwrap_or(7),
            cookie_secure: parsed_var("COOKIE_SECURE").unwrap_or(true),
            cleanup_interval_secs: parsed_var("SESSION_CLEANUP_INTERVAL_SECS").unwrap_or(3600),
        };
        let chat = ChatConfig {
            api_key: non_empty_var("CHAT_API_KEY"),
            api_url: std::env::var("CHAT_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into()),
            model: std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            timeout_secs: parsed_var("CHAT_TIMEOUT_SECS").unwrap_or(60),
        };
        let identity = IdentityConfig {
            session_data_url: std::env::var("IDENTITY_SESSION_URL").unwrap_or_else(|_| {
                "https://demobackend.emergentagent.com/auth/v1/env/oauth/session-data".into()
            }),
        };

        Ok(Self {
            database_url,
            database_name,
            max_connections,
            cors_origins,
            session,
            chat,
            identity,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Splits a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}
