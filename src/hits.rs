//! Request hit counter.
//!
//! Each server owns its own counter; nothing is global, so test servers in
//! the same process do not see each other's traffic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

#[derive(Debug, Clone, Default)]
pub struct HitCounter {
    hits: Arc<AtomicU64>,
}

impl HitCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one hit and return the new total.
    pub fn increment(&self) -> u64 {
        self.hits.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
    }
}

/// Middleware counting every request that passes through it.
///
/// ```ignore
/// router.layer(middleware::from_fn_with_state(counter.clone(), count_hits))
/// ```
pub async fn count_hits(State(counter): State<HitCounter>, request: Request, next: Next) -> Response {
    counter.increment();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app(counter: &HitCounter) -> Router {
        Router::new()
            .route("/app", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(counter.clone(), count_hits))
    }

    #[test]
    fn test_increment_get_reset() {
        let counter = HitCounter::new();
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(counter.get(), 2);

        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let counter = HitCounter::new();
        let clone = counter.clone();
        clone.increment();
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = HitCounter::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(), 8000);
    }

    #[tokio::test]
    async fn test_middleware_counts_requests() {
        let counter = HitCounter::new();
        let app = app(&counter);

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(axum::http::Request::builder().uri("/app").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(counter.get(), 3);
    }

    #[tokio::test]
    async fn test_servers_have_independent_counters() {
        let first = HitCounter::new();
        let second = HitCounter::new();

        app(&first)
            .oneshot(axum::http::Request::builder().uri("/app").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);
    }
}
