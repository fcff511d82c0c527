//! Authoritative store client: the routing table as one Redis hash.
//!
//! Fields of the hash are routing keys, field values are routing values.

use std::collections::BTreeMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use mapway_core::Config;

use crate::deadline::with_deadline;
use crate::error::DaemonError;

/// Key/value operations the engine needs from the authoritative store.
#[async_trait]
pub trait RouteStore: Send {
    async fn get(&mut self, key: &str) -> Result<Option<String>, DaemonError>;
    async fn set(&mut self, key: &str, value: &str) -> Result<(), DaemonError>;
    async fn delete(&mut self, key: &str) -> Result<(), DaemonError>;
    async fn get_all(&mut self) -> Result<BTreeMap<String, String>, DaemonError>;
}

/// [`RouteStore`] over `HGET`/`HSET`/`HDEL`/`HGETALL` on the configured hash.
pub struct RedisStore {
    conn: MultiplexedConnection,
    hash: String,
}

impl RedisStore {
    pub async fn connect(config: &Config) -> Result<Self, DaemonError> {
        let client = redis::Client::open(config.redis_url())?;
        let conn = with_deadline("store connect", config.op_timeout(), async {
            Ok::<_, DaemonError>(client.get_multiplexed_async_connection().await?)
        })
        .await?;
        tracing::debug!(url = %config.redis_url(), hash = %config.redis_key, "connected to store");
        Ok(Self {
            conn,
            hash: config.redis_key.clone(),
        })
    }
}

#[async_trait]
impl RouteStore for RedisStore {
    async fn get(&mut self, key: &str) -> Result<Option<String>, DaemonError> {
        let value: Option<String> = self.conn.hget(&self.hash, key).await?;
        Ok(value)
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<(), DaemonError> {
        let () = self.conn.hset(&self.hash, key, value).await?;
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<(), DaemonError> {
        let () = self.conn.hdel(&self.hash, key).await?;
        Ok(())
    }

    async fn get_all(&mut self) -> Result<BTreeMap<String, String>, DaemonError> {
        let all: BTreeMap<String, String> = self.conn.hgetall(&self.hash).await?;
        Ok(all)
    }
}
