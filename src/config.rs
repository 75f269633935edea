use std::env;

use crate::error::AppError;

pub const DEFAULT_JWT_SECRET: &str = "supersecret";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub cors_origin: String,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub store_url: String,
    pub event_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 5001,
            log_level: "info".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_secs: 86_400,
            store_url: "memory://".to_string(),
            event_buffer_size: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", defaults.http_port)?,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            cors_origin: lookup("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            jwt_secret: lookup("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            token_ttl_secs: parse_or_default(&lookup, "TOKEN_TTL_SECS", defaults.token_ttl_secs)?,
            store_url: lookup("STORE_URL").unwrap_or(defaults.store_url),
            event_buffer_size: parse_or_default(
                &lookup,
                "EVENT_BUFFER_SIZE",
                defaults.event_buffer_size,
            )?,
        };

        if config.jwt_secret.is_empty() {
            return Err(AppError::Internal("JWT_SECRET must not be empty".to_string()));
        }
        if config.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "EVENT_BUFFER_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}
