//! Identity resolution middleware.
//!
//! Resolves the `Authorization` header into a [`Principal`] attached to the
//! request extensions before any route or gate runs:
//!
//! - no header at all resolves to the anonymous principal; whether anonymous
//!   access is acceptable is a per-route decision made by the gates
//! - anything else must be exactly `Bearer <token>` with a well-formed
//!   26-character token that the store recognizes
//!
//! A malformed header, a token with the wrong shape, and a token the store
//! has never seen all produce the identical 401 response. Tokens are opaque
//! bearer secrets; the API must not reveal whether a given one ever existed.
//!
//! Every response passing through this layer carries `Vary: Authorization`
//! so shared caches never serve one client's authenticated response to
//! another.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, header};
use axum::response::IntoResponse;
use tower::{Layer, Service};

use crate::error::AppError;
use crate::models::{Principal, Scope, token};
use crate::store::{StoreError, UserStore};

/// Identity resolver layer for the Tower middleware stack.
#[derive(Clone)]
pub struct AuthenticateLayer {
    users: Arc<dyn UserStore>,
    op_timeout: Duration,
}

impl AuthenticateLayer {
    /// # Arguments
    ///
    /// * `users` - store used to resolve tokens to accounts
    /// * `op_timeout` - upper bound on the store lookup, so a stalled store
    ///   cannot wedge the request indefinitely
    pub fn new(users: Arc<dyn UserStore>, op_timeout: Duration) -> Self {
        Self { users, op_timeout }
    }
}

impl<S> Layer<S> for AuthenticateLayer {
    type Service = AuthenticateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticateService {
            inner,
            users: self.users.clone(),
            op_timeout: self.op_timeout,
        }
    }
}

/// Identity resolver service wrapper.
#[derive(Clone)]
pub struct AuthenticateService<S> {
    inner: S,
    users: Arc<dyn UserStore>,
    op_timeout: Duration,
}

impl<S> Service<Request<Body>> for AuthenticateService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let users = self.users.clone();
        let op_timeout = self.op_timeout;
        let mut inner = self.inner.clone();

        let auth_header = req.headers().get(header::AUTHORIZATION).cloned();

        Box::pin(async move {
            let principal = match resolve(auth_header, users.as_ref(), op_timeout).await {
                Ok(principal) => principal,
                Err(rejection) => {
                    return Ok(with_vary(rejection.into_response()));
                }
            };

            req.extensions_mut().insert(principal);

            let response = inner.call(req).await?;
            Ok(with_vary(response))
        })
    }
}

/// Resolve the `Authorization` header into a principal.
async fn resolve(
    auth_header: Option<header::HeaderValue>,
    users: &dyn UserStore,
    op_timeout: Duration,
) -> Result<Principal, AppError> {
    let Some(header_value) = auth_header else {
        return Ok(Principal::Anonymous);
    };

    let plaintext = header_value
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidAuthenticationToken)?;

    // Shape check before touching the store: nothing failing this was ever
    // issued by us.
    if !token::is_well_formed(plaintext) {
        return Err(AppError::InvalidAuthenticationToken);
    }

    let lookup = tokio::time::timeout(
        op_timeout,
        users.get_for_token(Scope::Authentication, plaintext),
    );

    match lookup.await {
        Ok(Ok(user)) => Ok(Principal::Known(Arc::new(user))),
        // Unknown token and malformed token are indistinguishable to clients.
        Ok(Err(StoreError::NotFound)) => Err(AppError::InvalidAuthenticationToken),
        Ok(Err(err)) => Err(err.into()),
        Err(_elapsed) => Err(AppError::Store(
            "token lookup timed out".to_string(),
        )),
    }
}

/// Append `Vary: Authorization` to a response.
fn with_vary(mut response: Response<Body>) -> Response<Body> {
    response.headers_mut().append(
        header::VARY,
        header::HeaderValue::from_static("Authorization"),
    );
    response
}
