use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

use crate::logging::LoggingConfig;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DATABASE_URL: &str = "sqlite://study_companion.db";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEV_JWT_SECRET: &str = "dev-secret-change-in-production";
const DEFAULT_JWT_EXPIRES_IN: &str = "30d";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JWT_EXPIRES_IN: {0}")]
    InvalidExpiresIn(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_ms: i64,
    pub using_dev_secret: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env_string("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let host = env_string("HOST")
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let database = DatabaseConfig {
            url: env_string("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            max_connections: env_string("DATABASE_MAX_CONNECTIONS")
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(5),
            busy_timeout: Duration::from_secs(30),
        };

        let configured_secret = env_string("JWT_SECRET");
        let using_dev_secret = configured_secret.is_none();
        let jwt_secret = configured_secret.unwrap_or_else(|| DEV_JWT_SECRET.to_string());
        let expires_in = env_string("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_JWT_EXPIRES_IN.to_string());
        let token_ttl_ms = parse_expires_in_ms(&expires_in)
            .ok_or_else(|| ConfigError::InvalidExpiresIn(expires_in.clone()))?;

        let frontend_url = env_string("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());
        let extra = env_string("CORS_EXTRA_ORIGINS").unwrap_or_default();
        let cors_origins = cors_origin_list(&frontend_url, &extra);

        Ok(Self {
            host,
            port,
            logging: LoggingConfig::from_env(),
            database,
            auth: AuthConfig {
                jwt_secret,
                token_ttl_ms,
                using_dev_secret,
            },
            cors_origins,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_ms: 30 * 24 * 60 * 60 * 1000,
            using_dev_secret: true,
        }
    }
}

/// Parses lifetimes such as `90s`, `15m`, `24h` or `30d` into milliseconds.
pub fn parse_expires_in_ms(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    let (unit_start, _) = trimmed.char_indices().last()?;
    if unit_start == 0 {
        return None;
    }

    let (digits, unit) = trimmed.split_at(unit_start);
    let amount: i64 = digits.parse().ok()?;
    if amount <= 0 {
        return None;
    }

    match unit {
        "s" => Some(amount * 1000),
        "m" => Some(amount * 60 * 1000),
        "h" => Some(amount * 60 * 60 * 1000),
        "d" => Some(amount * 24 * 60 * 60 * 1000),
        _ => None,
    }
}

fn cors_origin_list(frontend_url: &str, extra: &str) -> Vec<String> {
    let mut origins: Vec<String> = Vec::new();
    let candidates = std::iter::once(frontend_url)
        .chain(["http://localhost:3000", "http://localhost:3001"])
        .chain(extra.split(','));

    for origin in candidates {
        let origin = origin.trim().trim_end_matches('/');
        if origin.is_empty() || origins.iter().any(|existing| existing == origin) {
            continue;
        }
        origins.push(origin.to_string());
    }
    origins
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
