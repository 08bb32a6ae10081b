use crate::error::{ThrottlerError, ThrottlerResult};
use crate::store::{CountingStore, Histogram, Snapshot};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult, Script};
use std::future::Future;
use std::time::Duration;
use tokio::time;

/// Sets an expiry only if the key exists and has none.
const EXPIRE_IF_UNSET_SCRIPT: &str = r#"
if redis.call('TTL', KEYS[1]) == -1 then
    return redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return 0
"#;

/// Counting store backed by Redis hashes.
///
/// The caller owns the connection lifecycle: build one with
/// [`RedisStore::connect`] and share it behind an `Arc`.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    command_timeout: Duration,
    expire_script: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, command_timeout: Duration) -> ThrottlerResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            ThrottlerError::Configuration(format!("Invalid Redis URL '{}': {}", redis_url, e))
        })?;

        let manager = match time::timeout(command_timeout, ConnectionManager::new(client)).await {
            Ok(Ok(manager)) => manager,
            Ok(Err(e)) => {
                return Err(ThrottlerError::Store(format!("Failed to connect to Redis: {}", e)))
            }
            Err(_) => {
                return Err(ThrottlerError::Store(format!(
                    "Connecting to Redis timed out after {:?}",
                    command_timeout
                )))
            }
        };

        tracing::debug!(redis_url = %redis_url, "Connected to Redis");

        Ok(Self {
            manager,
            command_timeout,
            expire_script: Script::new(EXPIRE_IF_UNSET_SCRIPT),
        })
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> ThrottlerResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        bounded(self.command_timeout, op, fut).await
    }
}

/// Run one round trip under `deadline`. A reply that does not arrive in
/// time is a store failure like any other.
async fn bounded<T, F>(deadline: Duration, op: &str, fut: F) -> ThrottlerResult<T>
where
    F: Future<Output = RedisResult<T>>,
{
    match time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(|e| ThrottlerError::Store(format!("{} failed: {}", op, e))),
        Err(_) => Err(ThrottlerError::Store(format!(
            "{} timed out after {:?}",
            op, deadline
        ))),
    }
}

/// Redis reports -1 for "no expiry" and -2 for "no such key".
fn ttl_from_reply(ttl: i64) -> Option<Duration> {
    if ttl >= 0 {
        Some(Duration::from_secs(ttl as u64))
    } else {
        None
    }
}

#[async_trait]
impl CountingStore for RedisStore {
    async fn increment_and_snapshot(&self, key: &str, field: &str) -> ThrottlerResult<Histogram> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().hincr(key, field, 1).ignore().hgetall(key);

        let (histogram,): (Histogram,) = self
            .bounded("HINCRBY/HGETALL", async move {
                pipe.query_async(&mut conn).await
            })
            .await?;
        Ok(histogram)
    }

    async fn time_to_live(&self, key: &str) -> ThrottlerResult<Option<Duration>> {
        let mut conn = self.manager.clone();
        let key = key.to_string();
        let ttl: i64 = self
            .bounded("TTL", async move {
                redis::cmd("TTL").arg(&key).query_async(&mut conn).await
            })
            .await?;
        Ok(ttl_from_reply(ttl))
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> ThrottlerResult<()> {
        let mut conn = self.manager.clone();
        let mut invocation = self.expire_script.prepare_invoke();
        invocation.key(key).arg(ttl.as_secs());

        self.bounded("EXPIRE", async move {
            invocation.invoke_async::<_, i64>(&mut conn).await
        })
        .await?;
        Ok(())
    }

    async fn increment_and_snapshot_with_ttl(
        &self,
        key: &str,
        field: &str,
    ) -> ThrottlerResult<Snapshot> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hincr(key, field, 1)
            .ignore()
            .hgetall(key)
            .ttl(key);

        let (histogram, ttl): (Histogram, i64) = self
            .bounded("HINCRBY/HGETALL/TTL", async move {
                pipe.query_async(&mut conn).await
            })
            .await?;

        Ok(Snapshot {
            histogram,
            ttl: ttl_from_reply(ttl),
        })
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        let mut conn = self.manager.clone();
        let _: String = self
            .bounded("PING", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(())
    }
}
