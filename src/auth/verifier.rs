//! Credential verification with transparent upgrade of legacy passwords.

use super::{
    password::{Verification, hash_password},
    session::SessionState,
};
use crate::users::DynUserStore;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Enter both email and password.")]
    MissingCredentials,
    /// Unknown email and wrong password are deliberately the same value.
    #[error("Invalid credentials.")]
    InvalidCredentials,
    #[error("Login is temporarily unavailable.")]
    Unavailable(anyhow::Error),
}

#[derive(Clone)]
pub struct CredentialVerifier {
    store: DynUserStore,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(store: DynUserStore) -> Self {
        Self { store }
    }

    /// Check `email`/`password` and return the session to establish.
    ///
    /// A legacy plaintext match is upgraded to a hash before returning.
    ///
    /// # Errors
    /// `MissingCredentials` for blank input, `InvalidCredentials` for an unknown
    /// email or wrong password, `Unavailable` if the store fails.
    #[instrument(skip(self, password))]
    pub async fn verify_and_maybe_upgrade(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SessionState, AuthError> {
        let email = email.trim();
        let password = password.expose_secret();
        if email.is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let Some(user) = self
            .store
            .find_by_email(email)
            .await
            .map_err(AuthError::Unavailable)?
        else {
            debug!("no user for email");
            return Err(AuthError::InvalidCredentials);
        };

        match user.password.verify(password) {
            Verification::Match => {}
            Verification::MatchLegacy => {
                let hash = hash_password(password).map_err(AuthError::Unavailable)?;
                let upgraded = self
                    .store
                    .upgrade_password(user.id, &hash)
                    .await
                    .map_err(AuthError::Unavailable)?;
                if upgraded {
                    info!(user_id = user.id, "legacy password upgraded to hash");
                } else {
                    warn!(user_id = user.id, "legacy password already upgraded");
                }
            }
            Verification::Mismatch => {
                debug!(user_id = user.id, "password mismatch");
                return Err(AuthError::InvalidCredentials);
            }
        }

        Ok(SessionState {
            user_id: user.id,
            user_name: user.display_name(),
        })
    }
}
