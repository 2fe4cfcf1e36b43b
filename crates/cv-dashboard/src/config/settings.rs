use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::conversation::PruningPolicy;
use crate::services::polling::{BackoffPolicy, WatchConfig, DEFAULT_MAX_CONSECUTIVE_FAILURES};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub health: HealthConfig,
    pub job_watch: JobWatchConfig,
    pub conversation: ConversationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_mb: 10,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Backend health poll: exponential backoff, re-run periodically.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HealthConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub refresh_interval_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 2000,
            backoff_multiplier: 1.5,
            max_delay_ms: 10_000,
            refresh_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct JobWatchConfig {
    pub interval_ms: u64,
    pub max_consecutive_failures: u32,
}

impl Default for JobWatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ConversationConfig {
    pub max_history_bytes: usize,
    pub min_messages: usize,
    /// Idle time after which a session is dropped
    pub session_ttl_seconds: u64,
    /// New sessions are refused above this RAM usage; 100 disables the check
    pub memory_limit_percent: f64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_bytes: 10_000,
            min_messages: 5,
            session_ttl_seconds: 6 * 60 * 60,
            memory_limit_percent: 90.0,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

impl HealthConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

impl JobWatchConfig {
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            interval: Duration::from_millis(self.interval_ms.max(1)),
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }
}

impl ConversationConfig {
    pub fn pruning(&self) -> PruningPolicy {
        PruningPolicy::new(self.max_history_bytes, self.min_messages)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }
}
