//! Per-route authorization gates.
//!
//! A route declares the innermost [`Requirement`] it needs; the weaker
//! requirements it implies are evaluated automatically, in order, before it.
//! The implication relationship is data (see [`Requirement::chain`]) rather
//! than call-site nesting, so it can be unit tested in isolation.
//!
//! Each gate either defers to the next or terminates the chain with a
//! rejection. An anonymous principal therefore always fails with 401 from
//! the authentication gate before a permission lookup is even attempted,
//! never with 403.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};

use crate::error::AppError;
use crate::models::Principal;
use crate::store::PermissionStore;

/// What a route demands of the request's principal.
///
/// Each variant implies every weaker one: `Activated` implies
/// `Authenticated`, `Permission` implies both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Any non-anonymous principal.
    Authenticated,
    /// An authenticated principal whose account is activated.
    Activated,
    /// An activated principal holding the given permission code.
    Permission(&'static str),
}

impl Requirement {
    /// The ordered list of gates to evaluate, weakest first.
    pub fn chain(&self) -> Vec<Requirement> {
        match *self {
            Requirement::Authenticated => vec![Requirement::Authenticated],
            Requirement::Activated => vec![Requirement::Authenticated, Requirement::Activated],
            Requirement::Permission(code) => vec![
                Requirement::Authenticated,
                Requirement::Activated,
                Requirement::Permission(code),
            ],
        }
    }
}

/// Outcome of a single gate.
#[derive(Debug)]
enum Decision {
    /// This gate is satisfied; ask the next one.
    Defer,
    /// Terminate the chain with a rejection.
    Reject(AppError),
}

/// Evaluate the full implied chain for `requirement`.
///
/// Pure function of the principal and the permission store; no state is
/// carried between requests.
pub async fn evaluate(
    requirement: Requirement,
    principal: &Principal,
    permissions: &dyn PermissionStore,
    op_timeout: Duration,
) -> Result<(), AppError> {
    for gate in requirement.chain() {
        match decide(gate, principal, permissions, op_timeout).await? {
            Decision::Defer => continue,
            Decision::Reject(rejection) => return Err(rejection),
        }
    }

    Ok(())
}

async fn decide(
    gate: Requirement,
    principal: &Principal,
    permissions: &dyn PermissionStore,
    op_timeout: Duration,
) -> Result<Decision, AppError> {
    let decision = match gate {
        Requirement::Authenticated => match principal {
            Principal::Anonymous => Decision::Reject(AppError::AuthenticationRequired),
            Principal::Known(_) => Decision::Defer,
        },
        Requirement::Activated => match principal.user() {
            None => Decision::Reject(AppError::AuthenticationRequired),
            Some(user) if !user.activated => Decision::Reject(AppError::InactiveAccount),
            Some(_) => Decision::Defer,
        },
        Requirement::Permission(code) => {
            let Some(user) = principal.user() else {
                return Ok(Decision::Reject(AppError::AuthenticationRequired));
            };

            let granted = tokio::time::timeout(op_timeout, permissions.all_for_user(user.id))
                .await
                .map_err(|_elapsed| {
                    AppError::Store("permission lookup timed out".to_string())
                })??;

            if granted.includes(code) {
                Decision::Defer
            } else {
                Decision::Reject(AppError::NotPermitted)
            }
        }
    };

    Ok(decision)
}

/// Per-route authorization layer.
#[derive(Clone)]
pub struct RequireLayer {
    requirement: Requirement,
    permissions: Arc<dyn PermissionStore>,
    op_timeout: Duration,
}

impl RequireLayer {
    pub fn new(
        requirement: Requirement,
        permissions: Arc<dyn PermissionStore>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            requirement,
            permissions,
            op_timeout,
        }
    }
}

impl<S> Layer<S> for RequireLayer {
    type Service = RequireService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireService {
            inner,
            requirement: self.requirement,
            permissions: self.permissions.clone(),
            op_timeout: self.op_timeout,
        }
    }
}

/// Per-route authorization service wrapper.
#[derive(Clone)]
pub struct RequireService<S> {
    inner: S,
    requirement: Requirement,
    permissions: Arc<dyn PermissionStore>,
    op_timeout: Duration,
}

impl<S> Service<Request<Body>> for RequireService<S>
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
        let requirement = self.requirement;
        let permissions = self.permissions.clone();
        let op_timeout = self.op_timeout;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // The resolver runs earlier in the stack; its absence here is a
            // wiring bug, not a client error.
            let Some(principal) = req.extensions().get::<Principal>().cloned() else {
                return Ok(AppError::MissingPrincipal.into_response());
            };

            match evaluate(requirement, &principal, permissions.as_ref(), op_timeout).await {
                Ok(()) => inner.call(req).await,
                Err(rejection) => Ok(rejection.into_response()),
            }
        })
    }
}
