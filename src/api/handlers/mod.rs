//! Route handlers and shared input checks.

pub mod health;
pub mod login;
pub mod users;
pub mod users_html;

use regex::Regex;

/// Lightweight email sanity check applied before persisting data.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}
