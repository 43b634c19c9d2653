//! Per-browser session state kept in the `tower-sessions` store.
//!
//! Only two keys are written: `user_id` marks the session as authenticated,
//! `user_name` is a display string cached at login and never re-validated.

use serde::{Deserialize, Serialize};
use tower_sessions::{Session, session::Error};

pub const SESSION_COOKIE_NAME: &str = "registration_session";

const USER_ID_KEY: &str = "user_id";
const USER_NAME_KEY: &str = "user_name";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub user_id: i64,
    pub user_name: String,
}

impl SessionState {
    /// Read the authenticated state, `None` for an anonymous session.
    ///
    /// # Errors
    /// Returns an error if the session store cannot be read.
    pub async fn load(session: &Session) -> Result<Option<Self>, Error> {
        let Some(user_id) = session.get::<i64>(USER_ID_KEY).await? else {
            return Ok(None);
        };
        let user_name = session
            .get::<String>(USER_NAME_KEY)
            .await?
            .unwrap_or_default();
        Ok(Some(Self { user_id, user_name }))
    }

    /// Attach this state to `session` under a fresh session id.
    ///
    /// # Errors
    /// Returns an error if the session store cannot be written.
    pub async fn store(&self, session: &Session) -> Result<(), Error> {
        session.cycle_id().await?;
        session.insert(USER_ID_KEY, self.user_id).await?;
        session.insert(USER_NAME_KEY, &self.user_name).await
    }

    /// Drop all session data and delete the record from the store.
    ///
    /// # Errors
    /// Returns an error if the session store cannot be written.
    pub async fn clear(session: &Session) -> Result<(), Error> {
        session.flush().await
    }
}
