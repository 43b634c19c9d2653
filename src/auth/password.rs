//! Password hashing and verification (Argon2id, PHC strings).

use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::warn;

/// Stored form of a user's password, as selected by the `password_hashed` flag.
#[derive(Clone, PartialEq, Eq)]
pub enum StoredPassword {
    /// Argon2id PHC string.
    Hashed(String),
    /// Plaintext carried over from the legacy system, upgraded on first use.
    Legacy(String),
}

/// Result of checking a candidate password against a [`StoredPassword`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Match,
    /// Matched a legacy plaintext value; the caller should upgrade it.
    MatchLegacy,
    Mismatch,
}

impl StoredPassword {
    #[must_use]
    pub fn from_columns(value: String, hashed: bool) -> Self {
        if hashed {
            Self::Hashed(value)
        } else {
            Self::Legacy(value)
        }
    }

    #[must_use]
    pub const fn is_hashed(&self) -> bool {
        matches!(self, Self::Hashed(_))
    }

    /// Raw column value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hashed(value) | Self::Legacy(value) => value,
        }
    }

    #[must_use]
    pub fn verify(&self, candidate: &str) -> Verification {
        match self {
            Self::Hashed(hash) => {
                if verify_password(candidate, hash) {
                    Verification::Match
                } else {
                    Verification::Mismatch
                }
            }
            Self::Legacy(plain) => {
                if plain == candidate {
                    Verification::MatchLegacy
                } else {
                    Verification::Mismatch
                }
            }
        }
    }
}

impl std::fmt::Debug for StoredPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hashed(_) => f.write_str("Hashed(***)"),
            Self::Legacy(_) => f.write_str("Legacy(***)"),
        }
    }
}

/// Hash a password with a fresh random salt.
///
/// # Errors
/// Returns an error if Argon2 rejects the input.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

fn verify_password(candidate: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!("Stored password hash is malformed: {err}");
            false
        }
    }
}
