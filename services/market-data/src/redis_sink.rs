//! Redis-backed sink
//!
//! `SET` / `GET` / `DEL` for keys, `PUBLISH` for fan-out. The connection
//! manager reconnects on its own; a failed command is reported as a
//! `SinkError` and the connector retries on its next cycle.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::info;

use crate::error::SinkError;
use crate::sink::MarketSink;

pub struct RedisSink {
    connection: redis::aio::ConnectionManager,
}

impl RedisSink {
    pub async fn connect(url: &str) -> Result<Self, SinkError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        info!(url = %url, "Connected to redis sink");
        Ok(Self { connection })
    }
}

#[async_trait]
impl MarketSink for RedisSink {
    async fn set(&self, key: &str, value: &str) -> Result<(), SinkError> {
        let mut conn = self.connection.clone();
        let (): () = conn.set(key, value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SinkError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), SinkError> {
        let mut conn = self.connection.clone();
        let _removed: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), SinkError> {
        let mut conn = self.connection.clone();
        let _receivers: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }
}
