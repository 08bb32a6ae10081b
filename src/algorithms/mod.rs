//! Window configuration and the sliding window counter math.

pub mod sliding_window;

use crate::error::{ThrottlerError, ThrottlerResult};
use serde::Serialize;
use std::time::Duration;
use validator::Validate;

pub use sliding_window::{floor_to_bucket, BucketWidth, Tally};

/// Immutable window and budget for one limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Validate)]
pub struct WindowConfig {
    #[validate(range(min = 1, message = "window_seconds must be greater than 0"))]
    window_seconds: u64,
    #[validate(range(min = 1, message = "max_requests_per_window must be greater than 0"))]
    max_requests: u64,
}

impl WindowConfig {
    pub fn new(window_seconds: u64, max_requests: u64) -> ThrottlerResult<Self> {
        let config = Self {
            window_seconds,
            max_requests,
        };
        config
            .validate()
            .map_err(|e| ThrottlerError::Configuration(e.to_string()))?;
        Ok(config)
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn bucket_width(&self) -> BucketWidth {
        BucketWidth::for_window(self.window_seconds)
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    /// Estimated requests in the trailing window, this one included.
    pub requests_in_window: u64,
    /// Estimated seconds until the caller drops back under budget.
    /// Zero when allowed.
    pub wait_seconds: u64,
    pub limit: u64,
}

impl Decision {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.requests_in_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_config_rejects_zero() {
        let err = WindowConfig::new(0, 5).unwrap_err();
        assert!(matches!(err, ThrottlerError::Configuration(_)));
        assert!(err.to_string().contains("window_seconds"));

        let err = WindowConfig::new(30, 0).unwrap_err();
        assert!(err.to_string().contains("max_requests_per_window"));
    }

    #[test]
    fn test_window_config_accessors() {
        let config = WindowConfig::new(90, 10).unwrap();
        assert_eq!(config.window(), Duration::from_secs(90));
        assert_eq!(config.max_requests(), 10);
        assert_eq!(config.bucket_width(), BucketWidth::Minute);
    }

    #[test]
    fn test_remaining_saturates() {
        let decision = Decision {
            allowed: false,
            requests_in_window: 9,
            wait_seconds: 3,
            limit: 5,
        };
        assert_eq!(decision.remaining(), 0);
    }
}
