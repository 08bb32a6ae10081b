use crate::algorithms::sliding_window::{decide, floor_to_bucket, Tally};
use crate::algorithms::{Decision, WindowConfig};
use crate::clock::{Clock, SystemClock};
use crate::error::ThrottlerResult;
use crate::store::CountingStore;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_KEY_PREFIX: &str = "ratelimit:";

/// Sliding window rate limiter over a shared counting store.
///
/// Holds no mutable state of its own; clones share the store and clock.
#[derive(Clone)]
pub struct RateLimiter {
    config: WindowConfig,
    store: Arc<dyn CountingStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl RateLimiter {
    /// Validates the window and budget before the store is ever touched.
    pub fn new(
        window_seconds: u64,
        max_requests: u64,
        store: Arc<dyn CountingStore>,
    ) -> ThrottlerResult<Self> {
        let config = WindowConfig::new(window_seconds, max_requests)?;
        Ok(Self::with_config(config, store))
    }

    pub fn with_config(config: WindowConfig, store: Arc<dyn CountingStore>) -> Self {
        Self {
            config,
            store,
            clock: Arc::new(SystemClock),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CountingStore> {
        &self.store
    }

    fn store_key(&self, identity: &str) -> String {
        format!("{}{}", self.key_prefix, identity)
    }

    /// Count one request for `identity` and decide whether it is allowed.
    ///
    /// Store failures and corrupt histograms are returned as errors; the
    /// limiter never guesses an outcome it could not compute.
    pub async fn evaluate(&self, identity: &str) -> ThrottlerResult<Decision> {
        let key = self.store_key(identity);
        let now = self.clock.now_secs();
        let bucket_now = floor_to_bucket(now, self.config.bucket_width());

        let snapshot = self
            .store
            .increment_and_snapshot_with_ttl(&key, &bucket_now.to_string())
            .await?;

        let tally = Tally::from_histogram(&key, &snapshot.histogram, bucket_now, self.config.window_seconds())?;

        if snapshot.ttl.is_none() {
            // Two processes racing here both set the same window; harmless.
            self.store.expire_if_unset(&key, self.config.window()).await?;
        }

        let decision = decide(&tally, now, bucket_now, &self.config);

        debug!(
            identity = %identity,
            bucket = bucket_now,
            current = tally.current,
            previous = tally.previous,
            previous_buckets = tally.previous_buckets,
            requests_in_window = decision.requests_in_window,
            allowed = decision.allowed,
            wait_seconds = decision.wait_seconds,
            "Evaluated request"
        );

        Ok(decision)
    }
}
