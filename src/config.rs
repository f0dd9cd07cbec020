use std::time::Duration;

use anyhow::{Error, Result, anyhow, bail};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FallbackBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_notification_channel")]
    pub notification_channel: String,
    #[serde(default)]
    pub required_channels: Vec<String>,
    #[serde(default = "default_true")]
    pub verify_channels_on_startup: bool,
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    #[serde(default = "default_fallback_backend")]
    pub fallback_backend: FallbackBackend,
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_workers")]
    pub dispatch_workers: usize,
    #[serde(default = "default_workers")]
    pub reaction_workers: usize,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_notification_channel() -> String {
    "notifications".to_string()
}

fn default_true() -> bool {
    true
}

fn default_delivery_timeout_ms() -> u64 {
    30_000
}

fn default_fallback_backend() -> FallbackBackend {
    FallbackBackend::Postgres
}

fn default_database_max_connections() -> u32 {
    10
}

fn default_workers() -> usize {
    2
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

fn default_server_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.notification_channel.trim().is_empty() {
            bail!("NOTIFICATION_CHANNEL must not be empty");
        }
        if self.fallback_backend == FallbackBackend::Postgres && self.database_url.is_empty() {
            bail!("DATABASE_URL is required when FALLBACK_BACKEND=postgres");
        }
        if self.dispatch_workers == 0 || self.reaction_workers == 0 {
            bail!("DISPATCH_WORKERS and REACTION_WORKERS must be at least 1");
        }
        if self.delivery_timeout_ms == 0 {
            bail!("DELIVERY_TIMEOUT_MS must be greater than zero");
        }
        if self.max_retry_attempts == 0 {
            bail!("MAX_RETRY_ATTEMPTS must be at least 1");
        }
        Ok(())
    }

    /// Every channel the service cannot run without. The notification channel
    /// is always part of the list.
    pub fn required_channels(&self) -> Vec<String> {
        let mut channels = vec![self.notification_channel.clone()];
        for channel in &self.required_channels {
            let channel = channel.trim();
            if !channel.is_empty() && !channels.iter().any(|c| c == channel) {
                channels.push(channel.to_string());
            }
        }
        channels
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }
}
