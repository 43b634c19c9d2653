//! # Registration (users and session login)
//!
//! `registration` is a small backend for registering users and signing them in
//! to a server-rendered listing page.
//!
//! ## Credentials
//!
//! Passwords are stored as argon2 PHC strings. Rows imported from the legacy
//! system may still hold plaintext, flagged by `password_hashed = false`; such a
//! row is upgraded in place the first time its owner logs in successfully, or
//! eagerly with the `migrate-passwords` command.
//!
//! ## Sessions
//!
//! Logging in stores `user_id` and `user_name` in a cookie-keyed
//! `tower-sessions` record (Postgres in production). Protected pages sit behind
//! a gate that redirects anonymous visitors to `/login?next=<path>` and marks
//! every response as uncacheable.
//!
//! ## JSON API
//!
//! `/register` and `/users/{id}` expose plain CRUD over the same table, with
//! field-level validation errors. Passwords are write-only.

pub mod api;
pub mod auth;
pub mod cli;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
