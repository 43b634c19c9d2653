//! Eager upgrade of legacy plaintext passwords.
//!
//! Login upgrades a row the first time its owner signs in; accounts that never
//! log in again are handled here in one pass.

use super::UserStore;
use crate::auth::password::hash_password;
use anyhow::Result;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub upgraded: usize,
    /// Rows upgraded concurrently (e.g. by a login) or deleted mid-run.
    pub skipped: usize,
}

/// Hash every password still stored as plaintext.
///
/// # Errors
/// Returns an error if the store fails or a password cannot be hashed.
pub async fn migrate_legacy_passwords(store: &dyn UserStore) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    for (id, plaintext) in store.legacy_passwords().await? {
        let hash = hash_password(&plaintext)?;
        if store.upgrade_password(id, &hash).await? {
            debug!(user_id = id, "legacy password upgraded");
            report.upgraded += 1;
        } else {
            report.skipped += 1;
        }
    }

    info!(
        upgraded = report.upgraded,
        skipped = report.skipped,
        "legacy password migration finished"
    );

    Ok(report)
}
