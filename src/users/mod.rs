//! User records and the persistence seam.
//!
//! Handlers and the credential verifier only talk to [`UserStore`]. Production
//! wiring uses [`PgUserStore`]; [`MemoryUserStore`] backs `--memory` dev mode
//! and the test suites.
//!
//! The `password` column is interpreted through an explicit `password_hashed`
//! flag rather than by sniffing the stored value: rows created by this service
//! are always hashed, rows imported from the legacy system start out as
//! plaintext and are upgraded either on the next successful login or by the
//! `migrate-passwords` command.

pub mod memory;
pub mod migrate;
pub mod postgres;

pub use memory::MemoryUserStore;
pub use migrate::{MigrationReport, migrate_legacy_passwords};
pub use postgres::PgUserStore;

use crate::auth::password::StoredPassword;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: StoredPassword,
}

impl UserRecord {
    /// Name shown on the listing page and cached in the session.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Validated registration data; the password is already hashed.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Clone, Debug, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
    }
}

#[derive(Debug)]
pub enum CreateOutcome {
    Created(UserRecord),
    EmailTaken,
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(UserRecord),
    NotFound,
    EmailTaken,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Cheap liveness probe used by `/health`.
    async fn ping(&self) -> Result<()>;

    /// Exact, case-sensitive lookup by login email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>>;

    /// All users ordered by id.
    async fn list(&self) -> Result<Vec<UserRecord>>;

    async fn create(&self, user: NewUser) -> Result<CreateOutcome>;

    async fn update(&self, id: i64, changes: UserChanges) -> Result<UpdateOutcome>;

    /// Returns `false` when no row matched.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Replace a legacy plaintext password with `hash`, touching only the
    /// password columns. Returns `false` when the row is gone or was already
    /// upgraded by a concurrent request.
    async fn upgrade_password(&self, id: i64, hash: &str) -> Result<bool>;

    /// `(id, plaintext)` for every row still awaiting upgrade.
    async fn legacy_passwords(&self) -> Result<Vec<(i64, String)>>;
}

pub type DynUserStore = Arc<dyn UserStore>;
