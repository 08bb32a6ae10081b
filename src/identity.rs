//! Caller identity resolution for the admission middleware.

use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

/// Derives the rate limiting partition key from a request.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, request: &Request) -> String;
}

/// Identifies callers by client IP.
///
/// Looks at `X-Real-IP` first, then the first hop of `X-Forwarded-For`,
/// then the peer address recorded by axum's `ConnectInfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIpResolver;

impl IdentityResolver for ClientIpResolver {
    fn resolve(&self, request: &Request) -> String {
        get_client_ip(request)
    }
}

pub fn get_client_ip(request: &Request) -> String {
    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            let ip_str = ip_str.trim();
            if !ip_str.is_empty() {
                return ip_str.to_string();
            }
        }
    }

    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return first_ip.to_string();
                }
            }
        }
    }

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}
