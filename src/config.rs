use crate::domain::entities::{Role, SessionContext};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub socket_url: String,
    pub auth_token: Option<String>,
    pub user_id: String,
    pub user_name: Option<String>,
    pub user_role: Role,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub event_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let api_url =
            env::var("CHAT_API_URL").unwrap_or_else(|_| "http://127.0.0.1:5000/api".to_string());

        let socket_url =
            env::var("CHAT_SOCKET_URL").unwrap_or_else(|_| "ws://127.0.0.1:5000/ws".to_string());

        let auth_token = non_blank(env::var("CHAT_AUTH_TOKEN").ok());

        let user_id = non_blank(env::var("CHAT_USER_ID").ok()).ok_or(ConfigError::MissingUserId)?;

        let user_name = non_blank(env::var("CHAT_USER_NAME").ok());

        let user_role = env::var("CHAT_USER_ROLE")
            .unwrap_or_else(|_| "consultant".to_string())
            .parse()
            .map_err(ConfigError::InvalidRole)?;

        let reconnect_attempts = number_var("CHAT_RECONNECT_ATTEMPTS", 5)?;

        let reconnect_delay_ms = number_var("CHAT_RECONNECT_DELAY_MS", 2000)?;

        let http_timeout_secs = number_var("CHAT_HTTP_TIMEOUT_SECS", 30)?;

        let event_capacity = number_var("CHAT_EVENT_CAPACITY", 1000)?;

        Ok(Config {
            api_url,
            socket_url,
            auth_token,
            user_id,
            user_name,
            user_role,
            reconnect_attempts,
            reconnect_delay_ms,
            http_timeout_secs,
            event_capacity,
        })
    }

    pub fn session(&self) -> SessionContext {
        let mut session = SessionContext::new(self.user_id.clone(), self.user_role);
        if let Some(name) = &self.user_name {
            session = session.with_name(name.clone());
        }
        if let Some(token) = &self.auth_token {
            session = session.with_token(token.clone());
        }
        session
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn number_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    parse_number(name, env::var(name).ok(), default)
}

fn parse_number<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match non_blank(raw) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(name)),
        None => Ok(default),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CHAT_USER_ID environment variable not set")]
    MissingUserId,

    #[error("Invalid CHAT_USER_ROLE: {0}")]
    InvalidRole(String),

    #[error("Invalid number in {0}")]
    InvalidNumber(&'static str),
}
