//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (request direction)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Request ID/Trace │ ← correlation id + request/response logging
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Metrics Tap    │ ← counts in/out, accumulates latency
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Panic Guard    │ ← 500 + Connection: close on panic
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if the client's bucket is empty
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Authenticate   │ ← resolves the principal, 401 on bad tokens
//! └────────┬─────────┘
//!          ▼
//!   Router → per-route permission gates → Handler
//! ```
//!
//! Admission control runs before identity resolution so a flooding client
//! costs no token lookups; the tap and guard sit outside both so every
//! request is counted and no panic escapes.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{get, post, put};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::AppError;
use crate::handlers;
use crate::middleware::{
    AuthenticateLayer, MetricsTapLayer, PanicGuardLayer, RateLimitLayer, RequireLayer, Requirement,
};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;
    let op_timeout = config.store_op_timeout;

    let read_gate = RequireLayer::new(
        Requirement::Permission("movies:read"),
        state.stores.permissions.clone(),
        op_timeout,
    );
    let write_gate = RequireLayer::new(
        Requirement::Permission("movies:write"),
        state.stores.permissions.clone(),
        op_timeout,
    );

    let router = Router::new()
        // Healthcheck
        .route("/v1/healthcheck", get(handlers::healthcheck))
        // Movies (permission gated per method)
        .route(
            "/v1/movies",
            get(handlers::list_movies.layer(read_gate.clone()))
                .post(handlers::create_movie.layer(write_gate.clone())),
        )
        .route(
            "/v1/movies/{id}",
            get(handlers::show_movie.layer(read_gate))
                .patch(handlers::update_movie.layer(write_gate.clone()))
                .delete(handlers::delete_movie.layer(write_gate)),
        )
        // Users
        .route("/v1/users", post(handlers::register_user))
        .route("/v1/users/activated", put(handlers::activate_user))
        .route("/v1/users/password", put(handlers::update_user_password))
        // Tokens
        .route(
            "/v1/tokens/authentication",
            post(handlers::create_authentication_token),
        )
        .route(
            "/v1/tokens/activation",
            post(handlers::create_activation_token),
        )
        .route(
            "/v1/tokens/password-reset",
            post(handlers::create_password_reset_token),
        )
        // Metrics snapshot
        .route("/debug/metrics", get(handlers::debug_metrics))
        // JSON bodies for unknown paths and unsupported methods
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed);

    info!(
        rps = config.rate_limit_rps,
        burst = config.rate_limit_burst,
        enabled = config.rate_limit_enabled,
        "admission control configured"
    );

    // Layer order: each call wraps everything added before it, so the last
    // layer sees the request first.
    router
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(AuthenticateLayer::new(
            state.stores.users.clone(),
            op_timeout,
        ))
        .layer(RateLimitLayer::new(state.limiter.clone()))
        .layer(PanicGuardLayer::new())
        .layer(MetricsTapLayer::new(state.metrics.clone()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound
}

async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}
