//! Panic containment for the request pipeline.
//!
//! Everything downstream of this layer (admission control, identity
//! resolution, gates, handlers) runs inside a recovery boundary. A panic
//! anywhere in there becomes a clean 500 response instead of a severed
//! connection, with `Connection: close` set so the client does not reuse a
//! connection whose state may be inconsistent after the fault.
//!
//! This is the only place faults are converted into responses; every other
//! component prefers explicit rejection outcomes over panicking.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use axum::response::IntoResponse;
use futures_util::FutureExt;
use tower::{Layer, Service};
use tracing::error;

/// Panic guard layer for the Tower middleware stack.
#[derive(Clone, Default)]
pub struct PanicGuardLayer;

impl PanicGuardLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for PanicGuardLayer {
    type Service = PanicGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PanicGuardService { inner }
    }
}

/// Panic guard service wrapper.
#[derive(Clone)]
pub struct PanicGuardService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for PanicGuardService<S>
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
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let downstream = AssertUnwindSafe(async move { inner.call(req).await });

            match downstream.catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    // Logged apart from ordinary store faults: a panic here
                    // means a bug in the pipeline or a handler, not a failing
                    // dependency.
                    error!(panic = %panic_message(payload.as_ref()), "recovered panic while handling request");
                    Ok(panic_response())
                }
            }
        })
    }
}

fn panic_message(payload: &dyn Any) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

fn panic_response() -> Response<Body> {
    let body = serde_json::json!({
        "error": "internal_error",
        "message": "the server encountered a problem and could not process your request",
    });

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONNECTION, header::HeaderValue::from_static("close"))],
        axum::Json(body),
    )
        .into_response()
}
