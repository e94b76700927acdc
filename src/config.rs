use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_COLLECTION: &str = "todos";
pub const DEFAULT_DATABASE: &str = "(default)";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub collection: String,
    pub api_key: Option<String>,
    pub token: Option<String>,
    pub base_url: String,
    pub poll_interval: Duration,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            api_key: None,
            token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    /// Returns `Ok(None)` when no project is configured, which means the
    /// service runs in local mode.
    pub fn new_from_env() -> Result<Option<Self>, AppError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Option<Self>, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(project_id) = var("FIRESTORE_PROJECT_ID").filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };

        let mut config = Self::new(project_id.trim());
        if let Some(database) = var("FIRESTORE_DATABASE") {
            config.database = database;
        }
        if let Some(collection) = var("TASKS_COLLECTION") {
            config.collection = collection;
        }
        if let Some(base_url) = var("FIRESTORE_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        config.api_key = var("FIRESTORE_API_KEY").filter(|v| !v.is_empty());
        config.token = var("FIRESTORE_TOKEN").filter(|v| !v.is_empty());

        if let Some(raw) = var("FEED_POLL_INTERVAL_SECS") {
            let secs = raw.parse::<u64>().map_err(|_| {
                AppError::Config(format!("FEED_POLL_INTERVAL_SECS is not a number: {}", raw))
            })?;
            if secs == 0 {
                return Err(AppError::Config(
                    "FEED_POLL_INTERVAL_SECS must be at least 1".to_string(),
                ));
            }
            config.poll_interval = Duration::from_secs(secs);
        }

        Ok(Some(config))
    }
}

impl fmt::Debug for FirestoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirestoreConfig")
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub firestore: Option<FirestoreConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_addr = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("invalid BIND_ADDR {}: {}", raw_addr, e)))?;

        Ok(Self {
            bind_addr,
            firestore: FirestoreConfig::from_vars(&var)?,
        })
    }
}
