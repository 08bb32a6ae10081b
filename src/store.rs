//! Capability boundary over the shared atomic counting store.
//!
//! A store keeps, per identity key, a hash of bucket timestamp -> request
//! count. Everything the limiter needs from it is listed on
//! [`CountingStore`]; Redis and an in-process map both implement it.

use crate::error::ThrottlerResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Raw hash contents as stored: bucket field -> count, both as strings.
pub type Histogram = HashMap<String, String>;

/// Histogram plus the key's expiry, read in one step.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub histogram: Histogram,
    /// `None` when the key carries no expiry.
    pub ttl: Option<Duration>,
}

#[async_trait]
pub trait CountingStore: Send + Sync {
    /// Increment `field` of the hash at `key` by one and return the whole
    /// hash, as one indivisible operation with respect to other callers on
    /// the same key.
    async fn increment_and_snapshot(&self, key: &str, field: &str) -> ThrottlerResult<Histogram>;

    /// Remaining time to live of `key`, or `None` if no expiry is set.
    async fn time_to_live(&self, key: &str) -> ThrottlerResult<Option<Duration>>;

    /// Set the expiry of `key` to `ttl` unless one is already set.
    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> ThrottlerResult<()>;

    /// Increment and snapshot, also reporting the key's expiry.
    ///
    /// Stores that can read the TTL inside the same transaction should
    /// override this to save a round trip.
    async fn increment_and_snapshot_with_ttl(
        &self,
        key: &str,
        field: &str,
    ) -> ThrottlerResult<Snapshot> {
        let histogram = self.increment_and_snapshot(key, field).await?;
        let ttl = self.time_to_live(key).await?;
        Ok(Snapshot { histogram, ttl })
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        Ok(())
    }
}
