//! Sliding window counter.
//!
//! Requests are counted in coarse time buckets per identity. The count for
//! the trailing window is approximated by taking the current bucket in full
//! and the older in-window buckets weighted by how much of the window they
//! still overlap, assuming their requests were spread evenly. This costs one
//! pass over a handful of buckets instead of a timestamp per request.

use super::{Decision, WindowConfig};
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::store::Histogram;

/// Grid that request timestamps are rounded down to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketWidth {
    Second,
    Minute,
    Hour,
}

impl BucketWidth {
    /// Bucket width must stay small next to the window so that only a
    /// bounded number of buckets exist per identity.
    pub fn for_window(window_seconds: u64) -> Self {
        if window_seconds <= 60 {
            BucketWidth::Second
        } else if window_seconds <= 3600 {
            BucketWidth::Minute
        } else {
            BucketWidth::Hour
        }
    }

    pub fn seconds(self) -> i64 {
        match self {
            BucketWidth::Second => 1,
            BucketWidth::Minute => 60,
            BucketWidth::Hour => 3600,
        }
    }
}

pub fn floor_to_bucket(timestamp: i64, width: BucketWidth) -> i64 {
    timestamp - timestamp.rem_euclid(width.seconds())
}

/// Histogram entries split by age relative to the current bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub current: u64,
    pub previous: u64,
    pub previous_buckets: u32,
    /// Oldest in-window bucket seen, current bucket included.
    pub oldest_bucket: Option<i64>,
}

impl Tally {
    /// Parse and partition a raw histogram. `key` is only used for error
    /// reporting.
    pub fn from_histogram(
        key: &str,
        histogram: &Histogram,
        bucket_now: i64,
        window_seconds: u64,
    ) -> ThrottlerResult<Self> {
        let cutoff = bucket_now - window_seconds as i64;
        let mut tally = Tally::default();

        for (field, raw_count) in histogram {
            let bucket: i64 = field.parse().map_err(|_| ThrottlerError::DataCorruption {
                key: key.to_string(),
                detail: format!("bucket field '{}' is not a timestamp", field),
            })?;
            let count: u64 = raw_count.parse().map_err(|_| ThrottlerError::DataCorruption {
                key: key.to_string(),
                detail: format!("count '{}' for bucket {} is not a non-negative integer", raw_count, bucket),
            })?;

            if bucket < cutoff {
                continue;
            }

            tally.oldest_bucket = Some(tally.oldest_bucket.map_or(bucket, |b| b.min(bucket)));

            if bucket >= bucket_now {
                tally.current = tally.current.saturating_add(count);
            } else {
                tally.previous = tally.previous.saturating_add(count);
                tally.previous_buckets += 1;
            }
        }

        Ok(tally)
    }
}

/// Window used for weighting: the configured window, shrunk to the
/// identity's observed activity span when that is shorter.
pub fn effective_window(now: i64, oldest_bucket: Option<i64>, window_seconds: u64) -> u64 {
    match oldest_bucket {
        Some(oldest) => {
            let span = now - oldest;
            if span > 0 && (span as u64) < window_seconds {
                span as u64
            } else {
                window_seconds
            }
        }
        None => window_seconds,
    }
}

/// Weighted request count for the trailing window.
pub fn estimate(tally: &Tally, elapsed_in_bucket: u64, effective_window: u64) -> u64 {
    if effective_window == 0 {
        return tally.current.saturating_add(tally.previous);
    }
    let weight = (effective_window.saturating_sub(elapsed_in_bucket)) as f64 / effective_window as f64;
    let weighted_previous = (tally.previous as f64 * weight.clamp(0.0, 1.0)) as u64;
    weighted_previous.saturating_add(tally.current)
}

/// Seconds until enough of `estimate` ages out of the window to get back
/// under `max_requests`, assuming the same arrival rate. A heuristic only.
pub fn wait_seconds(estimate: u64, max_requests: u64, effective_window: u64) -> u64 {
    if estimate == 0 || estimate < max_requests {
        return 0;
    }
    let seconds_per_request = effective_window as f64 / estimate as f64;
    let excess = (estimate - max_requests + 1) as f64;
    (excess * seconds_per_request).ceil() as u64
}

/// Turn a tally into an allow/deny decision at time `now`.
pub fn decide(tally: &Tally, now: i64, bucket_now: i64, config: &WindowConfig) -> Decision {
    let elapsed = (now - bucket_now).max(0) as u64;
    let window = effective_window(now, tally.oldest_bucket, config.window_seconds());
    let requests_in_window = estimate(tally, elapsed, window);
    let allowed = requests_in_window < config.max_requests();

    Decision {
        allowed,
        requests_in_window,
        wait_seconds: if allowed {
            0
        } else {
            wait_seconds(requests_in_window, config.max_requests(), window)
        },
        limit: config.max_requests(),
    }
}
