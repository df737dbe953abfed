//! # Marquee
//!
//! A movie catalog HTTP API built on Axum, featuring:
//!
//! - **Abuse protection**: per-client token bucket admission control with
//!   idle-entry eviction
//! - **Security**: opaque bearer tokens (stored hashed), argon2 password
//!   hashing, layered permission gates
//! - **Resilience**: panic containment, bounded store lookups, graceful
//!   drain on shutdown
//! - **Observability**: request IDs, structured logging, request counters,
//!   Prometheus export
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Metrics → Panic Guard → Rate Limit → Auth)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Per-route gates (authenticated → activated → permission)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (healthcheck, movies, users, tokens)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Stores (movies, users, tokens, permissions)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marquee::{AppState, Config, build_router, server};
//! use marquee::store::Stores;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let grace = config.shutdown_grace;
//!     let addr = config.server_addr();
//!
//!     let state = AppState::new(Stores::in_memory(), config);
//!     let app = build_router(state.clone());
//!
//!     let listener = tokio::net::TcpListener::bind(&addr).await?;
//!     server::serve(app, listener, grace, server::shutdown_signal()).await?;
//!
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
