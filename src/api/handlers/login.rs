//! Login and logout for the server-rendered pages.

use super::users_html::USERS_HTML_PATH;
use crate::{
    api::pages::{self, LoginPage},
    auth::{AuthError, CredentialVerifier, LOGIN_PATH, SessionState},
};
use axum::{
    Form,
    extract::{Extension, Query},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use secrecy::SecretString;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

// No Debug: carries the submitted password.
#[derive(Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

/// Accept only local absolute paths as a post-login destination.
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|path| path.starts_with('/') && !path.starts_with("//") && !path.contains('\\'))
}

fn destination(next: Option<&str>) -> &str {
    safe_next(next).unwrap_or(USERS_HTML_PATH)
}

pub async fn login_page(session: Session, Query(query): Query<LoginQuery>) -> Response {
    match SessionState::load(&session).await {
        Ok(Some(_)) => return Redirect::to(destination(query.next.as_deref())).into_response(),
        Ok(None) => {}
        Err(err) => error!("Failed to load session: {err}"),
    }

    let page = LoginPage {
        next: safe_next(query.next.as_deref()),
        ..LoginPage::default()
    };
    Html(pages::login(&page)).into_response()
}

pub async fn login_submit(
    session: Session,
    Extension(verifier): Extension<CredentialVerifier>,
    Form(form): Form<LoginForm>,
) -> Response {
    let LoginForm {
        email,
        password,
        next,
    } = form;
    let password = SecretString::from(password);

    let result = verifier.verify_and_maybe_upgrade(&email, &password).await;

    let error = match result {
        Ok(state) => match state.store(&session).await {
            Ok(()) => {
                info!(user_id = state.user_id, "user logged in");
                return Redirect::to(destination(next.as_deref())).into_response();
            }
            Err(err) => {
                error!("Failed to store session: {err}");
                AuthError::Unavailable(anyhow::anyhow!("session store: {err}"))
            }
        },
        Err(err) => {
            if let AuthError::Unavailable(source) = &err {
                error!("Login failed on storage: {source:#}");
            }
            err
        }
    };

    let message = error.to_string();
    let page = LoginPage {
        email: email.trim(),
        next: safe_next(next.as_deref()),
        error: Some(&message),
    };
    (StatusCode::OK, Html(pages::login(&page))).into_response()
}

pub async fn logout(session: Session) -> Response {
    if let Err(err) = SessionState::clear(&session).await {
        error!("Failed to clear session: {err}");
    }
    Redirect::to(LOGIN_PATH).into_response()
}
