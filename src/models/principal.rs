//! The identity attached to a request.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::models::User;

/// The resolved identity of a request: either the anonymous sentinel or a
/// known account.
///
/// The identity resolver attaches exactly one `Principal` to the request
/// extensions before any authorization logic runs, and it is never replaced
/// afterwards. Extracting it from a request that has none is a wiring bug
/// (the resolver layer was not installed), reported as a 500 rather than a
/// panic.
#[derive(Debug, Clone)]
pub enum Principal {
    Anonymous,
    Known(Arc<User>),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    /// The underlying account, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::Known(user) => Some(user),
        }
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AppError::MissingPrincipal)
    }
}
