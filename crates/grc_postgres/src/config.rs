//! Connection settings and pool construction.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl DbConfig {
    /// `DATABASE_URL` is required; `GRC_DB_MAX_CONNECTIONS` defaults to 10.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .context("DATABASE_URL is not set")?;
        let max_connections = lookup("GRC_DB_MAX_CONNECTIONS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        })
    }

    pub async fn connect(&self) -> Result<PgPool> {
        info!(url = %mask_database_url(&self.database_url), "connecting to database");
        let mut options = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout);
        if let Some(idle) = self.idle_timeout {
            options = options.idle_timeout(idle);
        }
        let pool = options
            .connect(&self.database_url)
            .await
            .map_err(|e| {
                warn!(error = %e, "failed to connect to database");
                e
            })
            .context("connecting to database")?;
        info!(max_connections = self.max_connections, "database pool ready");
        Ok(pool)
    }
}

/// Hides the password component of a connection URL for logging.
fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let mut masked = parsed.clone();
            if parsed.password().is_some() {
                let _ = masked.set_password(Some("***"));
            }
            masked.to_string()
        }
        // Keyword/value strings may carry the password anywhere after the host.
        Err(_) => match url.get(..10) {
            Some(head) if url.len() > 20 => format!("{head}***"),
            _ => "***".to_string(),
        },
    }
}
