//! Server lifecycle: bind, listen, drain, stop.
//!
//! The lifecycle moves through Starting, Listening, Draining and Stopped,
//! with any failure short-circuiting to the caller:
//!
//! - Starting to Listening: the socket is bound by the caller and the accept
//!   loop begins inside [`serve`]
//! - Listening to Draining: the first termination signal stops the listener
//!   from accepting; in-flight requests keep running
//! - Draining to Stopped: every in-flight request finished inside the grace
//!   period; [`serve`] resolves `Ok`
//! - Draining to Failed: the grace period elapsed with work outstanding, or
//!   the accept loop itself failed
//!
//! The accept loop finishing after drain was requested is the expected
//! handshake. The accept loop finishing on its own, with no signal received,
//! is an unexpected fault and is reported as such. The outcome of the drain
//! goes to the process supervisor through the returned `Result`, never to an
//! HTTP client.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use thiserror::Error;
use tracing::{error, info, warn};

/// Terminal failures of the serve lifecycle.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("in-flight requests did not drain within {grace:?}")]
    DrainTimedOut { grace: Duration },

    #[error("accept loop terminated unexpectedly: {0}")]
    Unexpected(String),
}

/// Run the server until a shutdown signal arrives, then drain.
///
/// `shutdown` resolves with a label for the signal that triggered the drain
/// (see [`shutdown_signal`]); tests inject their own future here. Peer
/// addresses are attached to every request so admission control can key its
/// buckets by client.
pub async fn serve<F>(
    router: Router,
    listener: TcpListener,
    grace: Duration,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = &'static str> + Send + 'static,
{
    let addr = listener.local_addr()?;

    let drain_token = CancellationToken::new();
    let drain = drain_token.clone();

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { drain.cancelled().await });

    info!(addr = %addr, "starting server");

    let mut accept_loop = tokio::spawn(server.into_future());

    tokio::select! {
        // The accept loop ended although nobody asked it to stop.
        result = &mut accept_loop => {
            match result {
                Ok(Ok(())) => Err(ServeError::Unexpected(
                    "accept loop exited before shutdown was requested".to_string(),
                )),
                Ok(Err(e)) => Err(ServeError::Io(e)),
                Err(join_error) => Err(ServeError::Unexpected(join_error.to_string())),
            }
        }

        signal = shutdown => {
            info!(signal, "shutting down server");
            drain_token.cancel();

            match tokio::time::timeout(grace, &mut accept_loop).await {
                Ok(Ok(Ok(()))) => {
                    info!(addr = %addr, "stopped server");
                    Ok(())
                }
                Ok(Ok(Err(e))) => Err(ServeError::Io(e)),
                Ok(Err(join_error)) => Err(ServeError::Unexpected(join_error.to_string())),
                Err(_elapsed) => {
                    accept_loop.abort();
                    Err(ServeError::DrainTimedOut { grace })
                }
            }
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM) and report which one fired.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is a critical
/// initialization failure that should halt the application.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!("failed to install Ctrl+C handler: {e}");
                panic!("critical: cannot install Ctrl+C signal handler");
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                panic!("critical: cannot install SIGTERM signal handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received Ctrl+C, initiating graceful shutdown");
            "SIGINT"
        }
        _ = terminate => {
            warn!("received SIGTERM, initiating graceful shutdown");
            "SIGTERM"
        }
    }
}
