use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SESSION_COOKIE_SECURE: &str = "session-cookie-secure";

/// Two weeks, measured from the last request.
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 1_209_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub ttl_seconds: i64,
    pub cookie_secure: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if the TTL is not positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .unwrap_or(DEFAULT_SESSION_TTL_SECONDS);
        if ttl_seconds <= 0 {
            anyhow::bail!("--{ARG_SESSION_TTL_SECONDS} must be greater than zero");
        }

        Ok(Self {
            ttl_seconds,
            cookie_secure: matches.get_flag(ARG_SESSION_COOKIE_SECURE),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session inactivity TTL in seconds")
                .env("REGISTRATION_SESSION_TTL_SECONDS")
                .default_value("1209600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_SECURE)
                .long(ARG_SESSION_COOKIE_SECURE)
                .help("Only send the session cookie over HTTPS")
                .env("REGISTRATION_SESSION_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
}
