//! User accounts and password handling.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::validation::{Validator, is_plausible_email};

/// A registered account.
///
/// The password hash never leaves the server; `version` backs the
/// compare-and-increment update check in the store.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// An argon2 password hash in PHC string format.
#[derive(Clone, Default)]
pub struct Password {
    hash: String,
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keep hashes out of debug logs.
        f.write_str("Password(redacted)")
    }
}

impl Password {
    /// Hash a plaintext password with a fresh random salt.
    pub fn set(&mut self, plaintext: &str) -> AppResult<()> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

        self.hash = hash.to_string();
        Ok(())
    }

    /// Check a plaintext password against the stored hash.
    ///
    /// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
    pub fn matches(&self, plaintext: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(&self.hash)
            .map_err(|e| AppError::Internal(format!("stored password hash is invalid: {e}")))?;

        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!(
                "password verification failed: {e}"
            ))),
        }
    }

    /// True once a hash has been set.
    pub fn is_set(&self) -> bool {
        !self.hash.is_empty()
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(
        is_plausible_email(email),
        "email",
        "must be a valid email address",
    );
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= 8,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= 72,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn validate_user(v: &mut Validator, name: &str, email: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= 500,
        "name",
        "must not be more than 500 bytes long",
    );

    validate_email(v, email);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_set_and_match() {
        let mut password = Password::default();
        password.set("correct horse battery").unwrap();

        assert!(password.is_set());
        assert!(password.matches("correct horse battery").unwrap());
        assert!(!password.matches("wrong password").unwrap());
    }

    #[test]
    fn test_fresh_salt_per_hash() {
        let mut a = Password::default();
        let mut b = Password::default();
        a.set("same input").unwrap();
        b.set("same input").unwrap();

        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_unset_password_never_matches() {
        let password = Password::default();
        assert!(password.matches("anything").is_err());
    }

    #[test]
    fn test_debug_redacts_hash() {
        let mut password = Password::default();
        password.set("secret input").unwrap();
        assert_eq!(format!("{password:?}"), "Password(redacted)");
    }

    #[test]
    fn test_validate_password_length() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "short");
        assert!(!v.valid());

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"x".repeat(73));
        assert!(!v.valid());

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "long enough");
        assert!(v.valid());
    }

    #[test]
    fn test_validate_user() {
        let mut v = Validator::new();
        validate_user(&mut v, "Ada Wong", "a.wong@mail.com");
        assert!(v.valid());

        let mut v = Validator::new();
        validate_user(&mut v, "", "not-an-email");
        assert!(!v.valid());
    }
}
