use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::domains::issues::{EngineSettings, StatusPolicy};
use crate::kernel::RetryPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string; in-memory store when unset.
    pub database_url: Option<String>,
    pub port: u16,
    /// Per-subscriber backlog before a live client starts losing frames.
    pub stream_capacity: usize,
    pub stream_reap_interval: Duration,
    pub status_policy: StatusPolicy,
    pub duplicate_threshold: f64,
    pub store_retry_attempts: u32,
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            stream_capacity: env::var("STREAM_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .context("STREAM_CAPACITY must be a positive number")?,
            stream_reap_interval: parse_reap_interval(
                &env::var("STREAM_REAP_INTERVAL_SECS").unwrap_or_else(|_| "30".to_string()),
            )?,
            status_policy: env::var("STATUS_POLICY")
                .unwrap_or_else(|_| "reopenable".to_string())
                .parse()
                .context("STATUS_POLICY must be 'reopenable' or 'terminal'")?,
            duplicate_threshold: env::var("DUPLICATE_THRESHOLD")
                .unwrap_or_else(|_| "0.8".to_string())
                .parse()
                .context("DUPLICATE_THRESHOLD must be a number between 0 and 1")?,
            store_retry_attempts: env::var("STORE_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("STORE_RETRY_ATTEMPTS must be a positive number")?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            status_policy: self.status_policy,
            duplicate_threshold: self.duplicate_threshold,
            retry: RetryPolicy::new(self.store_retry_attempts, Duration::from_millis(10)),
        }
    }
}

/// A zero period would make the reaper's ticker panic.
fn parse_reap_interval(raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .context("STREAM_REAP_INTERVAL_SECS must be a number of seconds")?;
    if secs == 0 {
        anyhow::bail!("STREAM_REAP_INTERVAL_SECS must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}
