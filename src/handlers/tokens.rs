//! Token issuance endpoints.
//!
//! Authentication tokens prove an email/password pair; activation and
//! password-reset tokens prove control of the account's registered email.
//! Every plaintext leaves the server exactly once, in these responses; the
//! store only ever holds hashes.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::user::{validate_email, validate_password_plaintext};
use crate::models::{Scope, Token};
use crate::state::AppState;
use crate::store::{StoreError, TokenStore as _, UserStore as _};
use crate::validation::Validator;

#[derive(Deserialize)]
pub struct AuthenticationInput {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct AuthenticationTokenEnvelope {
    authentication_token: Token,
}

/// `POST /v1/tokens/authentication`
///
/// An unknown email and a wrong password produce the identical 401, so the
/// endpoint cannot be used to probe which addresses have accounts.
pub async fn create_authentication_token(
    State(state): State<AppState>,
    Json(input): Json<AuthenticationInput>,
) -> AppResult<Json<impl Serialize>> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let user = match state.stores.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::InvalidCredentials),
        Err(err) => return Err(err.into()),
    };

    if !user.password.matches(&input.password)? {
        return Err(AppError::InvalidCredentials);
    }

    let authentication_token = state
        .stores
        .tokens
        .create(user.id, state.config.auth_token_ttl, Scope::Authentication)
        .await?;

    Ok(Json(AuthenticationTokenEnvelope {
        authentication_token,
    }))
}

#[derive(Deserialize)]
pub struct EmailInput {
    email: String,
}

#[derive(Serialize)]
struct ActivationTokenEnvelope {
    activation_token: Token,
}

/// `POST /v1/tokens/activation`
///
/// Re-issues an activation token for an account that never completed
/// activation.
pub async fn create_activation_token(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> AppResult<impl IntoResponse> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    v.finish()?;

    let user = match state.stores.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            let mut v = Validator::new();
            v.add_error("email", "no matching email address found");
            return Err(v.into_error());
        }
        Err(err) => return Err(err.into()),
    };

    if user.activated {
        let mut v = Validator::new();
        v.add_error("email", "user has already been activated");
        return Err(v.into_error());
    }

    let activation_token = state
        .stores
        .tokens
        .create(user.id, state.config.activation_token_ttl, Scope::Activation)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ActivationTokenEnvelope { activation_token }),
    ))
}

#[derive(Serialize)]
struct PasswordResetTokenEnvelope {
    password_reset_token: Token,
}

/// `POST /v1/tokens/password-reset`
///
/// Only activated accounts can request a reset; an account that never
/// activated should go through activation instead.
pub async fn create_password_reset_token(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> AppResult<impl IntoResponse> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    v.finish()?;

    let user = match state.stores.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            let mut v = Validator::new();
            v.add_error("email", "no matching email address found");
            return Err(v.into_error());
        }
        Err(err) => return Err(err.into()),
    };

    if !user.activated {
        let mut v = Validator::new();
        v.add_error("email", "your user account must be activated to access this resource");
        return Err(v.into_error());
    }

    let password_reset_token = state
        .stores
        .tokens
        .create(
            user.id,
            state.config.password_reset_token_ttl,
            Scope::PasswordReset,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PasswordResetTokenEnvelope {
            password_reset_token,
        }),
    ))
}
