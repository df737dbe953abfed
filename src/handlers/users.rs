//! User registration, activation and password reset.
//!
//! These routes are deliberately ungated: a person registering or activating
//! an account has no credentials yet. The tokens involved are themselves the
//! proof of control.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::user::{Password, User, validate_password_plaintext, validate_user};
use crate::models::{Scope, Token, token};
use crate::state::AppState;
use crate::store::{PermissionStore as _, StoreError, TokenStore as _, UserStore as _};
use crate::validation::Validator;

/// Permissions every new account starts with.
const DEFAULT_PERMISSIONS: &[&str] = &["movies:read"];

#[derive(Serialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
pub struct RegisterUserInput {
    name: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct RegisteredEnvelope {
    user: User,
    activation_token: Token,
}

/// `POST /v1/users`
///
/// Creates an inactive account with the default read permission and issues
/// the activation token the client must present to `PUT /v1/users/activated`.
pub async fn register_user(
    State(state): State<AppState>,
    Json(input): Json<RegisterUserInput>,
) -> AppResult<impl IntoResponse> {
    let mut v = Validator::new();
    validate_user(&mut v, &input.name, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let mut password = Password::default();
    password.set(&input.password)?;

    let mut user = User {
        id: 0,
        created_at: Utc::now(),
        name: input.name,
        email: input.email,
        password,
        activated: false,
        version: 0,
    };

    if let Err(err) = state.stores.users.insert(&mut user).await {
        return match err {
            StoreError::DuplicateEmail => {
                let mut v = Validator::new();
                v.add_error("email", "a user with this email address already exists");
                Err(v.into_error())
            }
            other => Err(other.into()),
        };
    }

    state
        .stores
        .permissions
        .add_for_user(user.id, DEFAULT_PERMISSIONS)
        .await?;

    let activation_token = state
        .stores
        .tokens
        .create(user.id, state.config.activation_token_ttl, Scope::Activation)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisteredEnvelope {
            user,
            activation_token,
        }),
    ))
}

#[derive(Deserialize)]
pub struct ActivateUserInput {
    token: String,
}

/// `PUT /v1/users/activated`
///
/// Flips the account to activated and revokes all outstanding activation
/// tokens. The update rides the version check, so a concurrent modification
/// yields 409 rather than a lost write.
pub async fn activate_user(
    State(state): State<AppState>,
    Json(input): Json<ActivateUserInput>,
) -> AppResult<Json<impl Serialize>> {
    let mut v = Validator::new();
    token::validate_plaintext(&mut v, &input.token);
    v.finish()?;

    let mut user = match state
        .stores
        .users
        .get_for_token(Scope::Activation, &input.token)
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            let mut v = Validator::new();
            v.add_error("token", "invalid or expired activation token");
            return Err(v.into_error());
        }
        Err(err) => return Err(err.into()),
    };

    user.activated = true;
    state.stores.users.update(&mut user).await?;

    state
        .stores
        .tokens
        .delete_all_for_user(Scope::Activation, user.id)
        .await?;

    Ok(Json(UserEnvelope { user }))
}

#[derive(Deserialize)]
pub struct UpdatePasswordInput {
    token: String,
    password: String,
}

#[derive(Serialize)]
struct MessageEnvelope {
    message: &'static str,
}

/// `PUT /v1/users/password`
///
/// Resets the password for the account holding a valid password-reset token,
/// then revokes all reset tokens for that account.
pub async fn update_user_password(
    State(state): State<AppState>,
    Json(input): Json<UpdatePasswordInput>,
) -> AppResult<Json<impl Serialize>> {
    let mut v = Validator::new();
    token::validate_plaintext(&mut v, &input.token);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let mut user = match state
        .stores
        .users
        .get_for_token(Scope::PasswordReset, &input.token)
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            let mut v = Validator::new();
            v.add_error("token", "invalid or expired password reset token");
            return Err(v.into_error());
        }
        Err(err) => return Err(err.into()),
    };

    user.password.set(&input.password)?;
    state.stores.users.update(&mut user).await?;

    state
        .stores
        .tokens
        .delete_all_for_user(Scope::PasswordReset, user.id)
        .await?;

    Ok(Json(MessageEnvelope {
        message: "your password was successfully reset",
    }))
}
