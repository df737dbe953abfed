//! Opaque bearer tokens.
//!
//! A token is 16 bytes from the OS CSPRNG, base32-encoded into a 26-character
//! plaintext that is returned to the client exactly once. Only the SHA-256
//! hash of the plaintext is ever persisted, so a leaked store cannot be
//! replayed against the API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::validation::Validator;

/// Length of the base32 plaintext handed to clients.
pub const PLAINTEXT_LENGTH: usize = 26;

/// RFC 4648 base32 alphabet, unpadded.
const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// What a token is good for. Lookups are always scoped, so an activation
/// token can never be used to authenticate and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
    PasswordReset,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
            Scope::PasswordReset => "password-reset",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly issued token. The plaintext exists only on this value; the
/// store keeps the hash.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: [u8; 32],
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    /// Generate a new token for a user with the given lifetime and scope.
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> Self {
        let mut random_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut random_bytes);

        let plaintext = encode_base32(&random_bytes);
        let hash = hash_plaintext(&plaintext);

        Token {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        }
    }
}

/// SHA-256 of a plaintext token, the only form the store sees.
pub fn hash_plaintext(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Cheap shape check used before any store lookup: exact length and base32
/// alphabet. Anything failing this cannot be a token we issued.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == PLAINTEXT_LENGTH
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

/// Validate a client-supplied plaintext token, accumulating problems in `v`.
pub fn validate_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == PLAINTEXT_LENGTH,
        "token",
        "must be 26 bytes long",
    );
}

/// Unpadded base32 encoding. 16 input bytes produce 26 characters.
fn encode_base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u64 = 0;
    let mut bits: u32 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;

        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }

    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}
