//! Email/password authentication for the server-rendered pages.
//!
//! - [`verifier`] checks credentials and upgrades legacy plaintext passwords.
//! - [`session`] reads and writes the per-browser session state.
//! - [`gate`] protects pages that need a logged-in session.
//!
//! There is no lockout or rate limiting on failed logins.

pub mod gate;
pub mod password;
pub mod session;
pub mod verifier;

pub use gate::{LOGIN_PATH, guard, never_cache, require_login, stamp_no_cache};
pub use session::SessionState;
pub use verifier::{AuthError, CredentialVerifier};
