use crate::{
    api::handlers::{
        health,
        login::{login_page, login_submit, logout},
        users_html::{USERS_HTML_PATH, users_html},
    },
    auth::{CredentialVerifier, LOGIN_PATH, never_cache, require_login},
    users::DynUserStore,
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{ACCEPT, CONTENT_TYPE},
    },
    middleware::{from_fn, map_response},
    routing::{get, options},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tower_sessions::{SessionManagerLayer, SessionStore};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod handlers;
mod openapi;
pub mod pages;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Assemble every route: the documented JSON API, the public login pages and
/// the gated listing page.
///
/// Session handling is provided by `sessions`; production passes a Postgres
/// backed layer, tests and `--memory` mode pass a `MemoryStore`.
pub fn app<S>(store: DynUserStore, sessions: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    let verifier = CredentialVerifier::new(store.clone());

    let protected = Router::new()
        .route(USERS_HTML_PATH, get(users_html))
        .route_layer(from_fn(require_login));

    let pages = Router::new()
        .route(LOGIN_PATH, get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .layer(map_response(never_cache));

    // The OpenAPI document is only served by the `openapi` binary.
    let (router, _openapi) = router().split_for_parts();
    router
        .route("/health", options(health::health))
        .merge(protected)
        .merge(pages)
        .layer(sessions)
        .layer(Extension(verifier))
        .layer(Extension(store))
}

/// Start the server
/// # Errors
/// Return error if the CORS origin is invalid or the listener fails
pub async fn new<S>(
    port: u16,
    store: DynUserStore,
    sessions: SessionManagerLayer<S>,
    cors_origin: Option<&str>,
) -> Result<()>
where
    S: SessionStore + Clone,
{
    let cors = cors_layer(cors_origin)?;

    let app = app(store, sessions).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Credentials are only allowed for an explicit origin.
fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, ACCEPT])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]);

    match origin {
        Some(origin) => Ok(cors
            .allow_origin(AllowOrigin::exact(cors_origin(origin)?))
            .allow_credentials(true)),
        None => Ok(cors.allow_origin(AllowOrigin::any())),
    }
}

fn cors_origin(base_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(base_url).with_context(|| format!("Invalid CORS origin: {base_url}"))?;
    let host = parsed
        .host_str()
        .with_context(|| format!("CORS origin must include a valid host: {base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build CORS origin header")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::users::{MemoryUserStore, UserStore};
    use axum::{
        body::to_bytes,
        http::{
            StatusCode,
            header::{CACHE_CONTROL, COOKIE, LOCATION, SET_COOKIE},
        },
        response::Response,
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    fn test_app() -> (Arc<MemoryUserStore>, Router) {
        let store = Arc::new(MemoryUserStore::new());
        let sessions = SessionManagerLayer::new(MemoryStore::default())
            .with_name(crate::auth::session::SESSION_COOKIE_NAME)
            .with_secure(false);
        (store.clone(), app(store, sessions))
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    fn get_with_cookie(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn login_request(form: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(LOGIN_PATH)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    fn session_cookie(response: &Response) -> String {
        let value = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        value.split(';').next().unwrap().to_string()
    }

    fn location(response: &Response) -> &str {
        response.headers().get(LOCATION).unwrap().to_str().unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register_alice(app: &Router) -> Value {
        let response = send(
            app,
            json_request(
                Method::POST,
                "/register",
                &json!({
                    "first_name": "Alice",
                    "last_name": "Bell",
                    "email": "a@b.com",
                    "password": "hunter22"
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[test]
    fn cors_origin_strips_path() {
        let origin = cors_origin("https://app.example.com:8443/some/path").unwrap();
        assert_eq!(origin, "https://app.example.com:8443");
        assert!(cors_origin("not a url").is_err());
    }

    #[tokio::test]
    async fn anonymous_listing_redirects_to_login() {
        let (_store, app) = test_app();
        let response = send(&app, get_with_cookie(USERS_HTML_PATH, None)).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login?next=%2Fusers-html");
        assert!(
            response
                .headers()
                .get(CACHE_CONTROL)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("no-store")
        );
    }

    #[tokio::test]
    async fn login_page_is_not_cached() {
        let (_store, app) = test_app();
        let response = send(&app, get_with_cookie("/login?next=%2Fusers-html", None)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CACHE_CONTROL).is_some());
        let html = body_text(response).await;
        assert!(html.contains(r#"name="next" value="/users-html""#));
    }

    #[tokio::test]
    async fn legacy_login_then_listing_then_logout() {
        let (store, app) = test_app();
        store
            .insert_legacy("Alice", "Bell", "a@b.com", "hunter2")
            .await
            .unwrap();

        let response = send(
            &app,
            login_request("email=a%40b.com&password=hunter2&next=%2Fusers-html"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), USERS_HTML_PATH);
        let cookie = session_cookie(&response);
        assert!(cookie.starts_with("registration_session="));

        let user = store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert!(user.password.is_hashed());

        let response = send(&app, get_with_cookie(USERS_HTML_PATH, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CACHE_CONTROL).is_some());
        let html = body_text(response).await;
        assert!(html.contains("Signed in as <strong>Alice Bell</strong>"));
        assert!(html.contains("a@b.com"));

        // Authenticated visit to the login page goes straight to the listing.
        let response = send(&app, get_with_cookie(LOGIN_PATH, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), USERS_HTML_PATH);

        for _ in 0..2 {
            let response = send(&app, get_with_cookie("/logout", Some(&cookie))).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), LOGIN_PATH);
            assert!(response.headers().get(CACHE_CONTROL).is_some());
        }

        let response = send(&app, get_with_cookie(USERS_HTML_PATH, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login?next=%2Fusers-html");
    }

    #[tokio::test]
    async fn wrong_password_rerenders_form() {
        let (_store, app) = test_app();
        register_alice(&app).await;

        let response = send(&app, login_request("email=a%40b.com&password=nope")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Invalid credentials."));
        assert!(html.contains(r#"value="a@b.com""#));

        let response = send(&app, login_request("email=&password=")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Enter both email and password."));
    }

    #[tokio::test]
    async fn offsite_next_is_ignored() {
        let (_store, app) = test_app();
        register_alice(&app).await;

        let response = send(
            &app,
            login_request("email=a%40b.com&password=hunter22&next=%2F%2Fevil.example"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), USERS_HTML_PATH);
    }

    #[tokio::test]
    async fn register_hides_password_and_rejects_duplicates() {
        let (store, app) = test_app();
        let body = register_alice(&app).await;

        assert_eq!(body["email"], "a@b.com");
        assert!(body.get("password").is_none());
        let id = body["id"].as_i64().unwrap();
        let stored = store.find_by_id(id).await.unwrap().unwrap();
        assert!(stored.password.is_hashed());

        let response = send(
            &app,
            json_request(
                Method::POST,
                "/register",
                &json!({
                    "first_name": "Other",
                    "last_name": "Person",
                    "email": "a@b.com",
                    "password": "secret"
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"email": ["user registration with this email already exists."]})
        );
    }

    #[tokio::test]
    async fn register_reports_field_errors() {
        let (_store, app) = test_app();
        let response = send(
            &app,
            json_request(
                Method::POST,
                "/register",
                &json!({"first_name": " ", "email": "nope"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({
                "email": ["Enter a valid email address."],
                "first_name": ["This field may not be blank."],
                "last_name": ["This field is required."],
                "password": ["This field is required."],
            })
        );
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let (_store, app) = test_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/register")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn user_crud() {
        let (_store, app) = test_app();
        let id = register_alice(&app).await["id"].as_i64().unwrap();
        let path = format!("/users/{id}");

        let response = send(&app, get_with_cookie("/users", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().map(Vec::len), Some(1));

        let response = send(&app, get_with_cookie(&path, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["first_name"], "Alice");

        let response = send(
            &app,
            json_request(Method::PUT, &path, &json!({"first_name": "Alicia"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["first_name"], "Alicia");
        assert_eq!(body["last_name"], "Bell");

        let response = send(&app, json_request(Method::PUT, &path, &json!({}))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["first_name"], "Alicia");

        let delete = Request::builder()
            .method(Method::DELETE)
            .uri(&path)
            .body(Body::empty())
            .unwrap();
        let response = send(&app, delete).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, get_with_cookie(&path, None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({"error": "Not Found"}));
    }

    #[tokio::test]
    async fn password_change_applies_to_login() {
        let (_store, app) = test_app();
        let id = register_alice(&app).await["id"].as_i64().unwrap();

        let response = send(
            &app,
            json_request(
                Method::PUT,
                &format!("/users/{id}"),
                &json!({"password": "changed-pw"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, login_request("email=a%40b.com&password=hunter22")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, login_request("email=a%40b.com&password=changed-pw")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn put_to_missing_user_is_not_found_before_validation() {
        let (_store, app) = test_app();
        register_alice(&app).await;

        for body in [json!({"email": "bad"}), json!({"email": "a@b.com"})] {
            let response = send(&app, json_request(Method::PUT, "/users/999", &body)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{body}");
            assert_eq!(body_json(response).await, json!({"error": "Not Found"}));
        }

        let malformed = Request::builder()
            .method(Method::PUT)
            .uri("/users/999")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = send(&app, malformed).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_numeric_id_is_not_found() {
        let (_store, app) = test_app();
        let response = send(&app, get_with_cookie("/users/abc", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_store() {
        let (_store, app) = test_app();
        let response = send(&app, get_with_cookie("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("X-App").is_some());
        assert_eq!(body_json(response).await["database"], "ok");

        let options = Request::builder()
            .method(Method::OPTIONS)
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, options).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
