//! Redis-backed window store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{WindowEvent, WindowStore};
use crate::config::StoreConfig;
use crate::error::StoreError;

/// Replies expected from the batch: ZREMRANGEBYSCORE, ZCARD, ZADD, EXPIRE.
const BATCH_REPLIES: usize = 4;
const COUNT_REPLY: usize = 1;

/// Window store backed by Redis sorted sets.
///
/// The client is created eagerly but the connection is only established on
/// first use, then shared for the lifetime of the store. A failed connect
/// leaves the cell empty so the next check tries again.
pub struct RedisWindowStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisWindowStore {
    /// Create a store for the given connection settings. Does not connect.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        info!(
            host = %config.host,
            port = config.port,
            db = config.db,
            "Creating Redis window store"
        );

        let client = Client::open(config.connection_info())?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                debug!("Connecting to Redis");
                let conn = ConnectionManager::new(self.client.clone()).await?;
                info!("Redis connection established");
                Ok::<_, StoreError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn record(&self, key: &str, event: &WindowEvent) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrembyscore(key, "-inf", event.cutoff_millis)
            .zcard(key)
            .zadd(key, &event.member, event.at_millis)
            .expire(key, expire_secs(event.ttl_secs));

        let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
        parse_batch_reply(&replies)
    }
}

/// EXPIRE takes a signed seconds count.
fn expire_secs(ttl_secs: u64) -> i64 {
    i64::try_from(ttl_secs).unwrap_or(i64::MAX)
}

/// Extract the pre-insert count from the transaction reply.
///
/// Anything short of four clean replies means the batch did not run as a
/// whole, and no count can be trusted.
fn parse_batch_reply(replies: &[Value]) -> Result<u64, StoreError> {
    if replies.len() != BATCH_REPLIES {
        return Err(StoreError::PartialBatch(format!(
            "expected {} replies, got {}",
            BATCH_REPLIES,
            replies.len()
        )));
    }

    if let Some(failed) = replies.iter().find(|v| matches!(v, Value::ServerError(_))) {
        return Err(StoreError::PartialBatch(format!(
            "command failed inside batch: {:?}",
            failed
        )));
    }

    redis::from_redis_value::<u64>(&replies[COUNT_REPLY])
        .map_err(|e| StoreError::PartialBatch(format!("unreadable count reply: {}", e)))
}
