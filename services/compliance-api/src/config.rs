use compliance_service::OpenSanctionsConfig;
use config::{ConfigError, Environment};
use risk_engine::{EngineConfig, KvkConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub kvk: KvkConfig,
    pub opensanctions: OpenSanctionsConfig,
    pub sanctions: LocalListConfig,
    pub security: SecurityConfig,
    pub maintenance: MaintenanceConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: 4,
        }
    }
}

/// Shared cache backend. Without a URL the service runs on the in-process cache.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub op_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            op_timeout_ms: 250,
        }
    }
}

/// Local sanctions list, used when no OpenSanctions API key is configured
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LocalListConfig {
    pub list_name: String,
    pub csv_path: Option<String>,
}

impl Default for LocalListConfig {
    fn default() -> Self {
        Self {
            list_name: "local".to_string(),
            csv_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    /// Key for hashing caller identities before they reach logs or rate-limit keys
    pub caller_hash_key: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            caller_hash_key: "compliance-copilot".to_string(),
        }
    }
}

/// Background cleanup of the in-process maps
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_seconds: u64,
    /// Rate-limit buckets unused this long are dropped once full again
    pub bucket_idle_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            bucket_idle_seconds: 600,
        }
    }
}

impl MaintenanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    pub fn bucket_idle(&self) -> Duration {
        Duration::from_secs(self.bucket_idle_seconds)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Server defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?;

        builder = builder.add_source(
            Environment::with_prefix("COMPLIANCE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("engine.screener.source_priority"),
        );

        // Override from environment variables
        if let Ok(port) = env::var("SERVICE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        if let Ok(redis_url) = env::var("REDIS_URL") {
            builder = builder.set_override("redis.url", redis_url)?;
        }

        if let Ok(key) = env::var("KVK_API_KEY") {
            builder = builder.set_override("kvk.api_key", key)?;
        }

        if let Ok(key) = env::var("OPENSANCTIONS_API_KEY") {
            builder = builder.set_override("opensanctions.api_key", key)?;
        }

        if let Ok(priority) = env::var("SANCTIONS_SOURCE_PRIORITY") {
            builder = builder.set_override(
                "engine.screener.source_priority",
                parse_list(&priority),
            )?;
        }

        builder.build()?.try_deserialize()
    }
}

/// Split a comma separated list, dropping blanks
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
