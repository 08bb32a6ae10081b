use crate::error::ErrorResponse;
use crate::identity::{ClientIpResolver, IdentityResolver};
use crate::rate_limiter::RateLimiter;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self as axum_middleware, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, info};

/// Admission control in front of an arbitrary router.
#[derive(Clone)]
pub struct Admission {
    limiter: Arc<RateLimiter>,
    resolver: Arc<dyn IdentityResolver>,
}

impl Admission {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self::with_resolver(limiter, Arc::new(ClientIpResolver))
    }

    pub fn with_resolver(limiter: Arc<RateLimiter>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { limiter, resolver }
    }

    /// Wrap `router` so every request passes admission first. Responses
    /// from the wrapped routes are otherwise unchanged apart from the
    /// `X-RateLimit-*` headers.
    pub fn wrap<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum_middleware::from_fn_with_state(self, admission_middleware))
    }
}

fn set_limit_headers(headers: &mut HeaderMap, limit: u64, remaining: u64) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
}

pub async fn admission_middleware(
    State(admission): State<Admission>,
    request: Request,
    next: Next,
) -> Response {
    let identity = admission.resolver.resolve(&request);

    let decision = match admission.limiter.evaluate(&identity).await {
        Ok(decision) => decision,
        Err(err) => {
            error!(
                target: "slidegate::middleware",
                identity = %identity,
                category = err.category(),
                error = %err,
                "Rate limit evaluation failed"
            );
            return err.into_response();
        }
    };

    if !decision.allowed {
        info!(
            target: "slidegate::middleware",
            identity = %identity,
            method = %request.method(),
            uri = %request.uri(),
            requests_in_window = decision.requests_in_window,
            wait_seconds = decision.wait_seconds,
            "Rate limit exceeded"
        );

        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::rate_limited(decision.wait_seconds)),
        )
            .into_response();
        let headers = response.headers_mut();
        set_limit_headers(headers, decision.limit, 0);
        headers.insert("retry-after", HeaderValue::from(decision.wait_seconds));
        return response;
    }

    let mut response = next.run(request).await;
    set_limit_headers(response.headers_mut(), decision.limit, decision.remaining());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{ThrottlerError, ThrottlerResult};
    use crate::memory::MemoryStore;
    use crate::store::{CountingStore, Histogram};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::routing::get;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct FailingStore;

    #[async_trait]
    impl CountingStore for FailingStore {
        async fn increment_and_snapshot(&self, _key: &str, _field: &str) -> ThrottlerResult<Histogram> {
            Err(ThrottlerError::Store("EXECABORT Transaction discarded".into()))
        }

        async fn time_to_live(&self, _key: &str) -> ThrottlerResult<Option<Duration>> {
            Ok(None)
        }

        async fn expire_if_unset(&self, _key: &str, _ttl: Duration) -> ThrottlerResult<()> {
            Ok(())
        }
    }

    fn app(limiter: RateLimiter, hits: Arc<AtomicUsize>) -> Router {
        let router = Router::new().route(
            "/",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "ok"
                }
            }),
        );
        Admission::new(Arc::new(limiter)).wrap(router)
    }

    fn request_from(ip: &str) -> Request {
        axum::http::Request::builder()
            .uri("/")
            .header("x-real-ip", ip)
            .body(Body::empty())
            .unwrap()
    }

    fn memory_limiter(window_seconds: u64, max_requests: u64) -> RateLimiter {
        let clock = ManualClock::new(1_700_000_000);
        let store = MemoryStore::new(Arc::new(clock.clone()));
        RateLimiter::new(window_seconds, max_requests, Arc::new(store))
            .unwrap()
            .with_clock(Arc::new(clock))
    }

    #[tokio::test]
    async fn test_allowed_request_is_forwarded() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(memory_limiter(10, 3), hits.clone());

        let response = app.oneshot(request_from("10.0.0.1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "2");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_request_gets_429_with_wait() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(memory_limiter(1, 1), hits.clone());

        let first = app.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()["retry-after"], "1");
        assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

        let body = second.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Rate limit exceeded. Try again in 1 seconds");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let other = app.oneshot(request_from("10.0.0.2")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_failure_gets_500_without_forwarding() {
        let hits = Arc::new(AtomicUsize::new(0));
        let limiter = RateLimiter::new(10, 10, Arc::new(FailingStore)).unwrap();
        let app = app(limiter, hits.clone());

        let response = app.oneshot(request_from("10.0.0.1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("retry-after").is_none());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("EXECABORT"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_custom_resolver() {
        struct ApiKeyResolver;

        impl IdentityResolver for ApiKeyResolver {
            fn resolve(&self, request: &Request) -> String {
                request
                    .headers()
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("anonymous")
                    .to_string()
            }
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let admission = Admission::with_resolver(Arc::new(memory_limiter(10, 2)), Arc::new(ApiKeyResolver));
        let handler_hits = hits.clone();
        let app = admission.wrap(Router::new().route(
            "/",
            get(move || {
                let hits = handler_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "ok"
                }
            }),
        ));

        // Same IP, different keys: each is counted on its own
        for key in ["alpha", "beta", "alpha"] {
            let request = axum::http::Request::builder()
                .uri("/")
                .header("x-real-ip", "10.0.0.1")
                .header("x-api-key", key)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        let request = axum::http::Request::builder()
            .uri("/")
            .header("x-api-key", "alpha")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
