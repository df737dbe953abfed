//! Shared application state for Axum handlers.
//!
//! The state is cloned per request; everything inside is behind `Arc`.
//!
//! # Background Tasks
//!
//! One long-lived task sweeps idle rate-limiter entries. It is managed with
//! `tokio_util::task::TaskTracker` and a `CancellationToken`; call
//! [`AppState::shutdown`] after the server has drained to stop it cleanly.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::Config;
use crate::metrics::{self, RequestMetrics};
use crate::middleware::{AdmissionControl, SWEEP_INTERVAL};
use crate::store::Stores;

/// Shared application state for Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Store handles for every resource
    pub stores: Stores,
    /// Application configuration
    pub config: Arc<Config>,
    /// Per-client admission limiter
    pub limiter: Arc<AdmissionControl>,
    /// Request counters read by the snapshot endpoint
    pub metrics: Arc<RequestMetrics>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create new application state and spawn the limiter janitor.
    pub fn new(stores: Stores, config: Config) -> Self {
        let limiter = Arc::new(AdmissionControl::from_config(&config));

        let state = Self {
            stores,
            config: Arc::new(config),
            limiter,
            metrics: Arc::new(RequestMetrics::default()),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_limiter_sweep_task();

        state
    }

    /// Spawn the background task that evicts idle limiter entries.
    ///
    /// Wakes once a minute; a client idle past the configured threshold is
    /// dropped so the map cannot grow without bound from transient clients.
    fn spawn_limiter_sweep_task(&self) {
        let limiter = self.limiter.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(SWEEP_INTERVAL);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("limiter sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep_idle();
                        metrics::record_limiter_evictions(evicted as u64);
                        if evicted > 0 {
                            debug!(
                                evicted,
                                remaining = limiter.tracked_clients(),
                                "evicted idle rate limiter entries"
                            );
                        }
                    }
                }
            }

            debug!("limiter sweep task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// Signals cancellation, closes the tracker so nothing new can spawn,
    /// then waits for every task to finish.
    pub async fn shutdown(&self) {
        info!("stopping background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("all background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_shutdown_completes() {
        let state = AppState::new(Stores::in_memory(), Config::default());

        // Must resolve promptly even though the sweep ticker runs on a
        // one-minute interval.
        tokio::time::timeout(std::time::Duration::from_secs(1), state.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_limiter_honors_config() {
        let config = Config {
            rate_limit_burst: 2,
            ..Config::default()
        };
        let state = AppState::new(Stores::in_memory(), config);

        let client = "192.0.2.1".parse().unwrap();
        assert_eq!(state.limiter.check(client), crate::middleware::Admission::Allowed);
        assert_eq!(state.limiter.check(client), crate::middleware::Admission::Allowed);
        assert_eq!(state.limiter.check(client), crate::middleware::Admission::Limited);

        state.shutdown().await;
    }
}
