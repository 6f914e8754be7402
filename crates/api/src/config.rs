use std::path::PathBuf;
use std::str::FromStr;

/// A malformed environment variable.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be a valid {expected}, got {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long in-flight work may drain after a shutdown signal (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub database_url: String,
    /// Directory holding serialised model artifacts; relative `model_path`
    /// values recorded by the trainer are looked up here.
    pub model_dir: PathBuf,
    /// Serve this model version instead of the latest one.
    pub model_version: Option<String>,
    /// How often the model registry polls for newer versions (default: `60`).
    pub model_refresh_secs: u64,
    /// Where dashboard snapshots are persisted; `None` keeps them in memory only.
    pub snapshot_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `8000`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                       |
    /// | `DATABASE_URL`          | `sqlite://data/parking.db` |
    /// | `MODEL_DIR`             | `models`                   |
    /// | `MODEL_VERSION`         | unset (latest)             |
    /// | `MODEL_REFRESH_SECS`    | `60`                       |
    /// | `SNAPSHOT_DIR`          | `data/snapshots`           |
    pub fn from_env() -> Result<Self, ConfigError> {
        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 8000, "u16")?,
            cors_origins,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30, "u64")?,
            shutdown_timeout_secs: parse_env("SHUTDOWN_TIMEOUT_SECS", 30, "u64")?,
            database_url: env_or("DATABASE_URL", parkcast_db::DEFAULT_DATABASE_URL),
            model_dir: PathBuf::from(env_or("MODEL_DIR", "models")),
            model_version: non_empty_env("MODEL_VERSION"),
            model_refresh_secs: parse_env("MODEL_REFRESH_SECS", 60, "u64")?,
            snapshot_dir: Some(PathBuf::from(env_or("SNAPSHOT_DIR", "data/snapshots"))),
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    non_empty_env(var).unwrap_or_else(|| default.to_string())
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(var: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError> {
    match non_empty_env(var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError {
            var,
            expected,
            value,
        }),
    }
}
