use crate::users::{PgUserStore, migrate_legacy_passwords};
use anyhow::Result;
use secrecy::SecretString;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: SecretString,
}

/// Hash every legacy plaintext password in one pass.
/// # Errors
/// Returns an error if the database is unreachable or an upgrade fails.
pub async fn execute(args: Args) -> Result<()> {
    let pool = super::server::connect(&args.dsn).await?;
    let store = PgUserStore::new(pool);
    store.migrate().await?;

    let report = migrate_legacy_passwords(&store).await?;
    info!(
        upgraded = report.upgraded,
        skipped = report.skipped,
        "password migration complete"
    );
    println!(
        "upgraded {} legacy password(s), skipped {}",
        report.upgraded, report.skipped
    );

    Ok(())
}
