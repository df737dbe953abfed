//! Per-client admission control.
//!
//! # Algorithm
//!
//! One token bucket per client IP (port stripped). Buckets refill
//! continuously at `rps` tokens per second up to `burst` capacity, and each
//! admitted request consumes one token. A client seen for the first time
//! starts with a full bucket, so `burst` instantaneous requests are admitted
//! and the next one is rejected with 429.
//!
//! # Concurrency
//!
//! The client map is guarded by a single mutex held only for lookup, insert
//! and sweep. Each entry is an `Arc<Mutex<...>>` of its own, so the refill
//! arithmetic for one client never blocks requests from other clients and no
//! lock is ever held across an await point.
//!
//! # Eviction
//!
//! A janitor task (spawned by the application state) calls [`AdmissionControl::sweep_idle`]
//! once a minute and drops entries idle longer than the configured threshold,
//! bounding memory growth from transient clients. An evicted client's next
//! request sees a fresh full bucket.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::debug;

use crate::config::Config;
use crate::error::AppError;

/// How often the janitor sweeps the client map.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited,
}

/// Token bucket state for one client.
#[derive(Debug)]
struct ClientEntry {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientEntry {
    fn new(burst: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(burst),
            last_refill: now,
            last_seen: now,
        }
    }

    /// Refill from elapsed wall-clock time, then try to take one token.
    fn try_acquire(&mut self, rps: f64, burst: u32, now: Instant) -> Admission {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rps).min(f64::from(burst));
        self.last_refill = now;
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Admission::Allowed
        } else {
            Admission::Limited
        }
    }
}

/// Shared admission limiter state: one bucket per client plus the settings
/// every bucket is shaped by.
pub struct AdmissionControl {
    rps: f64,
    burst: u32,
    enabled: bool,
    idle_after: Duration,
    clients: Mutex<HashMap<IpAddr, Arc<Mutex<ClientEntry>>>>,
}

impl AdmissionControl {
    pub fn new(rps: f64, burst: u32, enabled: bool, idle_after: Duration) -> Self {
        Self {
            rps,
            burst,
            enabled,
            idle_after,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.rate_limit_rps,
            config.rate_limit_burst,
            config.rate_limit_enabled,
            config.rate_limit_idle,
        )
    }

    /// Decide whether to admit a request from `client`.
    ///
    /// A disabled limiter admits everything without touching any state.
    pub fn check(&self, client: IpAddr) -> Admission {
        if !self.enabled {
            return Admission::Allowed;
        }

        let now = Instant::now();

        // Map lock covers only the lookup/insert; the bucket update happens
        // under the entry's own lock.
        let entry = {
            let mut clients = lock_unpoisoned(&self.clients);
            clients
                .entry(client)
                .or_insert_with(|| Arc::new(Mutex::new(ClientEntry::new(self.burst, now))))
                .clone()
        };

        let mut entry = lock_unpoisoned(&entry);
        entry.try_acquire(self.rps, self.burst, now)
    }

    /// Drop entries idle longer than the configured threshold.
    ///
    /// Returns the number of evicted entries.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut clients = lock_unpoisoned(&self.clients);

        let before = clients.len();
        clients.retain(|_, entry| {
            let entry = lock_unpoisoned(entry);
            now.saturating_duration_since(entry.last_seen) <= self.idle_after
        });

        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        lock_unpoisoned(&self.clients).len()
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
/// Limiter state is a few plain numbers and stays usable either way.
fn lock_unpoisoned<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Admission control layer for the Tower middleware stack.
#[derive(Clone)]
pub struct RateLimitLayer {
    control: Arc<AdmissionControl>,
}

impl RateLimitLayer {
    pub fn new(control: Arc<AdmissionControl>) -> Self {
        Self { control }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            control: self.control.clone(),
        }
    }
}

/// Admission control service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    control: Arc<AdmissionControl>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        let control = self.control.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // Fail closed: a request whose peer address is unknown is not
            // silently admitted past the limiter.
            let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>().cloned()
            else {
                return Ok(AppError::Internal(
                    "client address unavailable for rate limiting".to_string(),
                )
                .into_response());
            };

            match control.check(peer.ip()) {
                Admission::Allowed => inner.call(req).await,
                Admission::Limited => {
                    debug!(client = %peer.ip(), path = %req.uri().path(), "rate limit exceeded");
                    Ok(AppError::RateLimited.into_response())
                }
            }
        })
    }
}
