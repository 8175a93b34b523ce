use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// How long a driver has to respond to an offer. Product copy says 24
    /// hours; kept configurable rather than hardcoded.
    pub offer_window_hours: i64,
    pub push_retry_limit: u32,
    pub position_history_limit: usize,
    pub event_buffer_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            offer_window_hours: parse_or_default("OFFER_WINDOW_HOURS", 24)?,
            push_retry_limit: parse_or_default("PUSH_RETRY_LIMIT", 3)?,
            position_history_limit: parse_or_default("POSITION_HISTORY_LIMIT", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            offer_window_hours: 24,
            push_retry_limit: 3,
            position_history_limit: 1024,
            event_buffer_size: 1024,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
