use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Process-wide configuration, built once in `main` and handed to each
/// component through application state. Nothing reads the environment after
/// startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Signing secret for short-lived access tokens.
    pub access_token_secret: String,
    /// Separate signing secret for refresh tokens, so a leaked access secret
    /// cannot mint long-lived credentials.
    pub refresh_token_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Endpoint of the external media host uploads are proxied to.
    pub upload_url: String,
    pub api_key: String,
    /// Local directory multipart files are staged in before forwarding.
    pub staging_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig {
                port: opt_parsed("PORT")?.unwrap_or(8000),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: opt_parsed("DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
            },
            auth: AuthConfig {
                access_token_secret: required("ACCESS_TOKEN_SECRET")?,
                refresh_token_secret: required("REFRESH_TOKEN_SECRET")?,
                access_token_ttl_minutes: opt_parsed("ACCESS_TOKEN_TTL_MINUTES")?.unwrap_or(15),
                refresh_token_ttl_days: opt_parsed("REFRESH_TOKEN_TTL_DAYS")?.unwrap_or(10),
            },
            media: MediaConfig {
                upload_url: required("MEDIA_UPLOAD_URL")?,
                api_key: env::var("MEDIA_API_KEY").unwrap_or_default(),
                staging_dir: env::var("MEDIA_STAGING_DIR")
                    .unwrap_or_else(|_| "public/temp".to_string()),
            },
            cors: CorsConfig {
                allowed_origin: env::var("CORS_ORIGIN").ok(),
            },
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn opt_parsed<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { var, value }),
        Err(_) => Ok(None),
    }
}
