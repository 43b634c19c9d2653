use crate::{api::pages, auth::SessionState, users::DynUserStore};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

pub const USERS_HTML_PATH: &str = "/users-html";

/// Listing page. Only reachable through the session gate, which provides
/// the [`SessionState`] extension.
pub async fn users_html(
    Extension(state): Extension<SessionState>,
    Extension(store): Extension<DynUserStore>,
) -> Response {
    match store.list().await {
        Ok(users) => Html(pages::users(&users, &state.user_name)).into_response(),
        Err(err) => {
            error!("Failed to list users: {err:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list users").into_response()
        }
    }
}
