//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary should run: the HTTP
//! server (the default) or the one-shot `migrate-passwords` command.

use crate::cli::actions::{Action, migrate, server};
use crate::cli::commands::{
    ARG_CORS_ORIGIN, ARG_DSN, ARG_MEMORY, ARG_PORT, CMD_MIGRATE_PASSWORDS, session,
};
use anyhow::{Context, Result};
use secrecy::SecretString;

fn dsn(matches: &clap::ArgMatches) -> Option<SecretString> {
    matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .map(SecretString::from)
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some(sub) = matches.subcommand_matches(CMD_MIGRATE_PASSWORDS) {
        let dsn = dsn(sub).context("missing required argument: --dsn")?;
        return Ok(Action::MigratePasswords(migrate::Args { dsn }));
    }

    let memory = matches.get_flag(ARG_MEMORY);
    let dsn = dsn(matches);
    if !memory && dsn.is_none() {
        anyhow::bail!("missing required argument: --dsn");
    }

    let session = session::Options::parse(matches)?;

    Ok(Action::Server(server::Args {
        port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080),
        dsn,
        memory,
        cors_origin: matches.get_one::<String>(ARG_CORS_ORIGIN).cloned(),
        session_ttl_seconds: session.ttl_seconds,
        session_cookie_secure: session.cookie_secure,
    }))
}
