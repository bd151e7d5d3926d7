use super::{CacheMetrics, CacheStore, MetricsRecorder};
use crate::error::{InfraError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Redis-backed cache
///
/// Expiry is delegated to Redis (`SET … PX`), which never serves a key past
/// its TTL. Every command runs under `op_timeout`; errors and timeouts are
/// logged and read as misses.
#[derive(Clone)]
pub struct RedisCache {
    redis: ConnectionManager,
    op_timeout: Duration,
    metrics: Arc<MetricsRecorder>,
}

impl RedisCache {
    pub fn new(redis: ConnectionManager, op_timeout: Duration) -> Self {
        RedisCache {
            redis,
            op_timeout,
            metrics: Arc::new(MetricsRecorder::default()),
        }
    }

    /// Open a managed connection to `url`
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| InfraError::Backend(format!("Timed out connecting to {}", url)))??;

        info!("Connected to Redis cache at {}", url);
        Ok(Self::new(manager, op_timeout))
    }

    async fn try_get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.redis.clone();
        timeout(self.op_timeout, conn.get::<_, Option<String>>(key))
            .await
            .map_err(|_| InfraError::Backend("GET timed out".to_string()))?
            .map_err(InfraError::from)
    }

    async fn try_set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.redis.clone();
        let millis = ttl.as_millis() as u64;

        if millis == 0 {
            // A zero TTL must read as expired; make sure no older value survives
            let _: () = timeout(self.op_timeout, conn.del(key))
                .await
                .map_err(|_| InfraError::Backend("DEL timed out".to_string()))??;
            return Ok(());
        }

        let cmd = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .to_owned();
        timeout(self.op_timeout, cmd.query_async::<_, ()>(&mut conn))
            .await
            .map_err(|_| InfraError::Backend("SET timed out".to_string()))?
            .map_err(InfraError::from)
    }

    async fn try_del(&self, key: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: () = timeout(self.op_timeout, conn.del(key))
            .await
            .map_err(|_| InfraError::Backend("DEL timed out".to_string()))??;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        match self.try_get(key).await {
            Ok(Some(value)) => {
                self.metrics.record_hit();
                Some(value)
            }
            Ok(None) => {
                self.metrics.record_miss();
                None
            }
            Err(e) => {
                error!("Redis error getting {}: {}", key, e);
                self.metrics.record_miss();
                None
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        match self.try_set(key, value, ttl).await {
            Ok(()) => self.metrics.record_set(),
            Err(e) => warn!("Redis error setting {}: {}", key, e),
        }
    }

    async fn invalidate(&self, key: &str) {
        match self.try_del(key).await {
            Ok(()) => self.metrics.record_delete(),
            Err(e) => warn!("Redis error invalidating {}: {}", key, e),
        }
    }

    fn metrics(&self) -> CacheMetrics {
        self.metrics.snapshot()
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
