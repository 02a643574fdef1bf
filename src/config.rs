// src/config.rs

use std::{env, fmt, path::PathBuf, time::Duration};

use dotenvy::dotenv;

use crate::services::comment::DEFAULT_MAX_DEPTH;

/// Runtime configuration, read once at startup and passed down through `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Socket address the HTTP server binds to (e.g. "0.0.0.0:8080").
    pub listen_addr: String,
    pub rust_log: String,
    /// Directory for the daily rolling log file.
    pub log_dir: String,
    /// Upper bound for a single store call made on behalf of a request.
    pub request_timeout: Duration,
    pub max_connections: u32,
    /// Deepest level a reply may sit at (a thread root is level 1).
    pub max_thread_depth: u32,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Directory with the browser client, served as the router fallback when set.
    pub static_dir: Option<PathBuf>,
}

/// Raised when a required variable is missing or a value does not parse.
#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid { key, value } => write!(f, "{} has an invalid value: {:?}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let listen_addr = env::var("ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());

        let request_timeout = Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 5)?);

        let max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 5)?;

        let max_thread_depth = parse_or("MAX_THREAD_DEPTH", DEFAULT_MAX_DEPTH)?;
        if max_thread_depth == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_THREAD_DEPTH",
                value: "0".to_string(),
            });
        }

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let static_dir = env::var("STATIC_DIR")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url,
            listen_addr,
            rust_log,
            log_dir,
            request_timeout,
            max_connections,
            max_thread_depth,
            cors_origins,
            static_dir,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
