//! axum hooks that feed the [`Accumulator`] from inbound HTTP traffic.
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use pizza_metrics::{Accumulator, middleware::instrument_router};
//! use std::sync::Arc;
//!
//! let accumulator = Arc::new(Accumulator::new());
//! let app: Router = instrument_router(
//!     Router::new().route("/", get(|| async { "welcome to JWT Pizza" })),
//!     accumulator,
//! );
//! ```

use crate::Accumulator;
use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    middleware::{Next, from_fn_with_state},
    response::Response,
};
use http_body_util::BodyExt;
use std::{sync::Arc, time::Instant};

/// Count every request by its HTTP method.
pub async fn track_requests(
    State(accumulator): State<Arc<Accumulator>>,
    req: Request,
    next: Next,
) -> Response {
    accumulator.record_request(req.method().as_str());
    next.run(req).await
}

/// Time every request from hook entry until its response body is finished.
///
/// The clock stops when the response body is dropped, which happens once it
/// has been fully written. Handlers that stream slowly are timed for the
/// whole stream, not just until their headers. A request whose handler is
/// cancelled before producing a response records nothing.
pub async fn track_latency(
    State(accumulator): State<Arc<Accumulator>>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let (parts, body) = next.run(req).await.into_parts();

    let guard = LatencyGuard {
        accumulator,
        started,
    };
    let body = body.map_frame(move |frame| {
        let _guard = &guard;
        frame
    });
    Response::from_parts(parts, Body::new(body))
}

/// Attach [`track_requests`] and [`track_latency`] to every route of
/// `router`.
pub fn instrument_router<S>(router: Router<S>, accumulator: Arc<Accumulator>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(from_fn_with_state(accumulator.clone(), track_latency))
        .layer(from_fn_with_state(accumulator, track_requests))
}

struct LatencyGuard {
    accumulator: Arc<Accumulator>,
    started: Instant,
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        self.accumulator
            .record_request_latency(self.started.elapsed());
    }
}
