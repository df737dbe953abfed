//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible
//! defaults for development. In production, configure via environment
//! variables or a `.env` file. The configuration is a snapshot taken at
//! startup; there is no hot reload.
//!
//! # Abuse Protection
//!
//! - `RATE_LIMIT_RPS` / `RATE_LIMIT_BURST`: per-client token bucket shape
//! - `RATE_LIMIT_ENABLED`: disable admission control entirely (load tests)
//! - `RATE_LIMIT_IDLE_SECS`: how long a client may be silent before its
//!   limiter state is evicted
//!
//! # Lifecycle
//!
//! - `SHUTDOWN_GRACE_SECS`: how long in-flight requests get to finish after
//!   the first termination signal
//! - `STORE_OP_TIMEOUT_SECS`: upper bound on any single store lookup made by
//!   the middleware pipeline

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 4000)
    pub port: u16,

    /// Deployment environment label reported by the healthcheck
    /// (development|staging|production)
    pub environment: String,

    // =========================================================================
    // Admission Control Configuration
    // =========================================================================
    /// Sustained requests per second allowed per client (default: 2)
    pub rate_limit_rps: f64,

    /// Maximum requests a single client may burst (default: 4)
    pub rate_limit_burst: u32,

    /// Master switch for admission control (default: true)
    pub rate_limit_enabled: bool,

    /// Idle time after which a client's limiter entry is evicted
    /// (default: 180 seconds)
    pub rate_limit_idle: Duration,

    // =========================================================================
    // Lifecycle Configuration
    // =========================================================================
    /// Grace period for in-flight requests during shutdown (default: 30s)
    pub shutdown_grace: Duration,

    /// Timeout for store lookups made from the middleware pipeline
    /// (default: 3 seconds)
    pub store_op_timeout: Duration,

    // =========================================================================
    // Request Limits
    // =========================================================================
    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Token Lifetimes
    // =========================================================================
    /// Lifetime of authentication tokens (default: 24 hours)
    pub auth_token_ttl: Duration,

    /// Lifetime of account activation tokens (default: 3 days)
    pub activation_token_ttl: Duration,

    /// Lifetime of password reset tokens (default: 45 minutes)
    pub password_reset_token_ttl: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for the Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if any value fails to parse or the
    /// combination is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 4000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            // Admission control
            rate_limit_rps: Self::parse_env("RATE_LIMIT_RPS", 2.0)?,
            rate_limit_burst: Self::parse_env("RATE_LIMIT_BURST", 4)?,
            rate_limit_enabled: Self::parse_env("RATE_LIMIT_ENABLED", true)?,
            rate_limit_idle: Duration::from_secs(Self::parse_env("RATE_LIMIT_IDLE_SECS", 180)?),

            // Lifecycle
            shutdown_grace: Duration::from_secs(Self::parse_env("SHUTDOWN_GRACE_SECS", 30)?),
            store_op_timeout: Duration::from_secs(Self::parse_env("STORE_OP_TIMEOUT_SECS", 3)?),

            // Request limits
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1_048_576)?,

            // Token lifetimes
            auth_token_ttl: Duration::from_secs(
                Self::parse_env("AUTH_TOKEN_TTL_HOURS", 24u64)? * 3600,
            ),
            activation_token_ttl: Duration::from_secs(
                Self::parse_env("ACTIVATION_TOKEN_TTL_HOURS", 72u64)? * 3600,
            ),
            password_reset_token_ttl: Duration::from_secs(
                Self::parse_env("PASSWORD_RESET_TOKEN_TTL_MINS", 45u64)? * 60,
            ),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    fn validate(&self) -> AppResult<()> {
        if self.rate_limit_enabled {
            if self.rate_limit_rps <= 0.0 {
                return Err(AppError::Internal(
                    "RATE_LIMIT_RPS must be greater than 0 when rate limiting is enabled"
                        .to_string(),
                ));
            }
            if self.rate_limit_burst == 0 {
                return Err(AppError::Internal(
                    "RATE_LIMIT_BURST must be greater than 0 when rate limiting is enabled"
                        .to_string(),
                ));
            }
        }

        if self.rate_limit_idle.is_zero() {
            return Err(AppError::Internal(
                "RATE_LIMIT_IDLE_SECS must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_grace.is_zero() {
            return Err(AppError::Internal(
                "SHUTDOWN_GRACE_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::Internal(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::Internal(format!("invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 4000,
            environment: "development".to_string(),
            // Admission control
            rate_limit_rps: 2.0,
            rate_limit_burst: 4,
            rate_limit_enabled: true,
            rate_limit_idle: Duration::from_secs(180),
            // Lifecycle
            shutdown_grace: Duration::from_secs(30),
            store_op_timeout: Duration::from_secs(3),
            // Request limits
            max_request_body_size: 1_048_576,
            // Token lifetimes
            auth_token_ttl: Duration::from_secs(24 * 3600),
            activation_token_ttl: Duration::from_secs(72 * 3600),
            password_reset_token_ttl: Duration::from_secs(45 * 60),
            // Observability
            metrics_port: 9090,
        }
    }
}
