//! Distributed per-identity sliding window rate limiting.
//!
//! Request counts live in a shared [`CountingStore`] (Redis in production),
//! bucketed by time per identity. [`RateLimiter::evaluate`] bumps and reads
//! an identity's buckets in one atomic step and turns them into a
//! [`Decision`]; [`Admission`] puts that in front of an axum router.

pub mod algorithms;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod memory;
pub mod middleware;
pub mod rate_limiter;
pub mod redis;
pub mod response;
pub mod server;
pub mod store;

pub use algorithms::{Decision, WindowConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{ThrottlerError, ThrottlerResult};
pub use identity::{ClientIpResolver, IdentityResolver};
pub use memory::MemoryStore;
pub use middleware::Admission;
pub use rate_limiter::RateLimiter;
pub use crate::redis::RedisStore;
pub use server::create_app;
pub use store::{CountingStore, Histogram, Snapshot};
