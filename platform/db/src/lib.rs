//! Database primitives shared by the server and integration tests.

mod convert;
mod store;

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub use store::SeaOrmDealStore;

/// Shared connection pool alias.
pub type DbPool = DatabaseConnection;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing (env {0})")]
    MissingUrl(String),
    #[error("invalid setting {key}: {value}")]
    InvalidSetting { key: &'static str, value: String },
    #[error(transparent)]
    Connect(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment-driven connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_key")]
    env_key: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self::new(default_url_key())
    }
}

fn default_url_key() -> String {
    "DATABASE_URL".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    3_000
}

fn default_max_connections() -> u32 {
    10
}

impl DatabaseSettings {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }

    /// Reads `DB_CONNECT_TIMEOUT_MS` and `DB_MAX_CONNECTIONS` on top of defaults.
    pub fn from_env() -> DbResult<Self> {
        let mut settings = Self::default();
        if let Ok(raw) = std::env::var("DB_CONNECT_TIMEOUT_MS") {
            settings.connect_timeout_ms = raw.trim().parse().map_err(|_| DbError::InvalidSetting {
                key: "DB_CONNECT_TIMEOUT_MS",
                value: raw.clone(),
            })?;
        }
        if let Ok(raw) = std::env::var("DB_MAX_CONNECTIONS") {
            settings.max_connections = raw.trim().parse().map_err(|_| DbError::InvalidSetting {
                key: "DB_MAX_CONNECTIONS",
                value: raw.clone(),
            })?;
        }
        Ok(settings)
    }

    pub fn database_url(&self) -> DbResult<String> {
        std::env::var(&self.env_key).map_err(|_| DbError::MissingUrl(self.env_key.clone()))
    }

    pub fn connect_options(&self, url: impl Into<String>) -> ConnectOptions {
        let timeout = Duration::from_millis(self.connect_timeout_ms);
        let mut options = ConnectOptions::new(url.into());
        options
            .max_connections(self.max_connections)
            .connect_timeout(timeout)
            .acquire_timeout(timeout)
            .sqlx_logging(false);
        options
    }
}

pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let url = settings.database_url()?;
    let pool = Database::connect(settings.connect_options(url)).await?;
    info!(max_connections = settings.max_connections, "database pool ready");
    Ok(pool)
}
