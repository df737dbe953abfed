//! Request metrics tap.
//!
//! Pure observer at the outer edge of the pipeline: counts requests in,
//! responses out, and accumulates processing time. It never alters control
//! flow or response content; removing it changes nothing about correctness,
//! only about operability.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use crate::metrics::{self, RequestMetrics};

/// Metrics tap layer for the Tower middleware stack.
#[derive(Clone)]
pub struct MetricsTapLayer {
    metrics: Arc<RequestMetrics>,
}

impl MetricsTapLayer {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for MetricsTapLayer {
    type Service = MetricsTapService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsTapService {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

/// Metrics tap service wrapper.
#[derive(Clone)]
pub struct MetricsTapService<S> {
    inner: S,
    metrics: Arc<RequestMetrics>,
}

impl<S> Service<Request<Body>> for MetricsTapService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let counters = self.metrics.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let method = req.method().clone();
            let start = Instant::now();

            counters.record_received();
            metrics::record_request_received();

            let response = inner.call(req).await?;

            let elapsed = start.elapsed();
            counters.record_sent(elapsed);
            metrics::record_request_completed(
                method.as_str(),
                response.status().as_u16(),
                elapsed.as_secs_f64(),
            );

            Ok(response)
        })
    }
}
