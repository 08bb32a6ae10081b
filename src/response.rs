use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub store_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Self::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store_connected: true,
            error: None,
        }
    }

    pub fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy".to_string(),
            timestamp: Self::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store_connected: false,
            error: Some(error),
        }
    }
}

/// Body returned by the demo root route.
#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub ip: String,
}
