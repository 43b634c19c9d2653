//! `-v` / `REGISTRATION_LOG_LEVEL`: how much the service logs.
//!
//! The flag counts repetitions (`-vvv`); the env var takes either a level
//! name or the same count as a number. Both end up as a `u8` in the matches.

use clap::{Arg, ArgAction, Command, builder::ValueParser};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order; index 0 means errors only.
const LEVELS: [(&str, Option<Level>); 5] = [
    ("error", None),
    ("warn", Some(Level::WARN)),
    ("info", Some(Level::INFO)),
    ("debug", Some(Level::DEBUG)),
    ("trace", Some(Level::TRACE)),
];

const MAX_NUMERIC_VERBOSITY: u8 = 5;

fn parse_verbosity(level: &str) -> Result<u8, String> {
    let level = level.trim();
    if let Ok(count) = level.parse::<u8>() {
        return if count <= MAX_NUMERIC_VERBOSITY {
            Ok(count)
        } else {
            Err(format!(
                "log level {count} out of range (0-{MAX_NUMERIC_VERBOSITY})"
            ))
        };
    }

    LEVELS
        .iter()
        .zip(0u8..)
        .find(|((name, _), _)| name.eq_ignore_ascii_case(level))
        .map(|(_, index)| index)
        .ok_or_else(|| {
            format!("invalid log level {level:?}, expected error, warn, info, debug or trace")
        })
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_verbosity)
}

/// Tracing level for a verbosity count. `None` leaves the subscriber at its
/// default of errors only; anything past `trace` stays at `trace`.
#[must_use]
pub fn tracing_level(verbosity: u8) -> Option<Level> {
    let index = usize::from(verbosity).min(LEVELS.len() - 1);
    LEVELS[index].1
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Log verbosity, repeat for more: -v WARN, -vv INFO (login and session events), -vvv DEBUG, -vvvv TRACE")
            .long_help(
                "Log verbosity. Errors are always logged. Repeat -v to add warnings, then login, logout and password upgrade events (INFO), then store queries (DEBUG, TRACE). REGISTRATION_LOG_LEVEL accepts a level name or a count from 0 to 5.",
            )
            .env("REGISTRATION_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
