//! Client configuration loaded from environment variables.
//!
//! A `.env` file is honored for local development.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Directory name under the platform data dir.
pub const APP_DIR_NAME: &str = "runique";

/// SQLite database file name inside the data dir.
pub const DATABASE_FILE_NAME: &str = "runs.db";

/// Session file name inside the data dir.
pub const SESSION_FILE_NAME: &str = "session.json";

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the run backend (no trailing slash)
    pub base_url: String,
    /// API key sent with every backend request
    pub api_key: String,
    /// Directory holding the local database and session file
    pub data_dir: PathBuf,
    /// Per-request timeout for backend calls
    pub request_timeout: Duration,
    /// Quiet period after a sync request before a sync pass starts
    pub sync_debounce: Duration,
    /// First retry delay after a sync pass left entries behind
    pub sync_backoff_initial: Duration,
    /// Upper bound for the retry delay between failed sync passes
    pub sync_backoff_max: Duration,
    /// Interval for periodic remote fetches
    pub fetch_interval: Duration,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: "test_api_key".to_string(),
            data_dir: env::temp_dir().join(APP_DIR_NAME),
            request_timeout: Duration::from_secs(5),
            sync_debounce: Duration::from_millis(10),
            sync_backoff_initial: Duration::from_millis(20),
            sync_backoff_max: Duration::from_millis(200),
            fetch_interval: Duration::from_secs(60),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            base_url: env::var("RUNIQUE_BASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("RUNIQUE_BASE_URL"))?,
            api_key: env::var("RUNIQUE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("RUNIQUE_API_KEY"))?,
            data_dir: env::var("RUNIQUE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),
            request_timeout: Duration::from_secs(parse_or(
                "RUNIQUE_REQUEST_TIMEOUT_SECS",
                30,
            )?),
            sync_debounce: Duration::from_millis(parse_or("RUNIQUE_SYNC_DEBOUNCE_MS", 500)?),
            sync_backoff_initial: Duration::from_millis(parse_or(
                "RUNIQUE_SYNC_BACKOFF_INITIAL_MS",
                2000,
            )?),
            sync_backoff_max: Duration::from_secs(parse_or(
                "RUNIQUE_SYNC_BACKOFF_MAX_SECS",
                300,
            )?),
            fetch_interval: Duration::from_secs(
                parse_or("RUNIQUE_FETCH_INTERVAL_MINS", 30)? * 60,
            ),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE_NAME)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_or(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, value)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
