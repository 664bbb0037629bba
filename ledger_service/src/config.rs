use std::time::Duration;

use anyhow::{Context, Result};

/// Process configuration, loaded once at startup from the environment
/// (`.env` is read first via `dotenvy` if present, mirroring how the
/// original system picked up its settings from the shell).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub bank_base_url: String,
    pub bank_timeout: Duration,
    pub withdrawal_max_retries: u32,
    pub due_scan_interval: Duration,
    pub retry_scan_interval: Duration,
    pub executor_workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: optional("HOST", "0.0.0.0"),
            port: optional("PORT", "8080").parse().context("PORT must be a u16")?,
            bank_base_url: required("BANK_BASE_URL")?,
            bank_timeout: Duration::from_secs(
                optional("BANK_TIMEOUT_SECONDS", "5")
                    .parse()
                    .context("BANK_TIMEOUT_SECONDS must be an integer")?,
            ),
            withdrawal_max_retries: optional("WITHDRAWAL_MAX_RETRIES", "3")
                .parse()
                .context("WITHDRAWAL_MAX_RETRIES must be an integer")?,
            due_scan_interval: Duration::from_secs(
                optional("DUE_SCAN_INTERVAL_SECONDS", "5")
                    .parse()
                    .context("DUE_SCAN_INTERVAL_SECONDS must be an integer")?,
            ),
            retry_scan_interval: Duration::from_secs(
                optional("RETRY_SCAN_INTERVAL_SECONDS", "30")
                    .parse()
                    .context("RETRY_SCAN_INTERVAL_SECONDS must be an integer")?,
            ),
            executor_workers: optional("EXECUTOR_WORKERS", "4")
                .parse()
                .context("EXECUTOR_WORKERS must be an integer")?,
        })
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
