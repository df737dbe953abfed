//! HTTP middleware: abuse protection, identity, authorization and observability.
//!
//! # Architecture
//!
//! ```text
//! Request → Metrics Tap → Panic Guard → Rate Limiter → Authenticate → Router
//!                             ↓              ↓              ↓            ↓
//!                      500 + close       429 Too Many   401 Unauth   per-route
//!                                                                    gates
//! ```
//!
//! The tap and guard wrap everything so that every request is counted and no
//! panic escapes; admission control runs before any credential work so a
//! flooding client cannot force token lookups; the resolver attaches exactly
//! one principal for the gates and handlers downstream.

pub mod auth;
pub mod guard;
pub mod metrics_tap;
pub mod panic_guard;
pub mod rate_limit;

pub use auth::AuthenticateLayer;
pub use guard::{Requirement, RequireLayer};
pub use metrics_tap::MetricsTapLayer;
pub use panic_guard::PanicGuardLayer;
pub use rate_limit::{Admission, AdmissionControl, RateLimitLayer, SWEEP_INTERVAL};
