//! Session gate for server-rendered pages.
//!
//! [`guard`] is the access decision itself: it gets the caller's session state
//! explicitly and either redirects to the login page or runs the next handler.
//! [`require_login`] adapts it to an axum middleware for `route_layer`.
//! Every response leaving the gate, including the redirect, is marked
//! uncacheable so the back button cannot replay a protected page after logout.

use super::session::SessionState;
use axum::{
    extract::Request,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, EXPIRES, PRAGMA},
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::future::Future;
use tower_sessions::Session;
use tracing::{debug, error};
use url::form_urlencoded;

pub const LOGIN_PATH: &str = "/login";

const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Overwrite the caching directives on a response.
pub fn stamp_no_cache(headers: &mut HeaderMap) {
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

/// `map_response` hook for routes that are public but must not be cached.
pub async fn never_cache(mut response: Response) -> Response {
    stamp_no_cache(response.headers_mut());
    response
}

/// Login URL that returns the user to `path` afterwards.
///
/// `next` is form-urlencoded, so `/users-html` becomes `next=%2Fusers-html`;
/// the login handlers read it back decoded through `Query`/`Form`.
#[must_use]
pub fn login_redirect_target(path: &str) -> String {
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", path)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

/// Run `next` only for an authenticated session.
///
/// The session state is inserted into the request extensions so protected
/// handlers can read it with `Extension<SessionState>`.
pub async fn guard<F, Fut, R>(state: Option<SessionState>, mut request: Request, next: F) -> Response
where
    F: FnOnce(Request) -> Fut,
    Fut: Future<Output = R>,
    R: IntoResponse,
{
    let mut response = match state {
        Some(state) => {
            request.extensions_mut().insert(state);
            next(request).await.into_response()
        }
        None => {
            let target = login_redirect_target(request.uri().path());
            debug!(target = %target, "anonymous request redirected to login");
            Redirect::to(&target).into_response()
        }
    };
    stamp_no_cache(response.headers_mut());
    response
}

/// Axum middleware: load [`SessionState`] from the session store and [`guard`].
pub async fn require_login(session: Session, request: Request, next: Next) -> Response {
    let state = match SessionState::load(&session).await {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to load session: {err}");
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            stamp_no_cache(response.headers_mut());
            return response;
        }
    };
    guard(state, request, |request| next.run(request)).await
}
