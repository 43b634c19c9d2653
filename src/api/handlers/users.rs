//! JSON endpoints for registering and managing users.
//!
//! Updates are partial: only the fields present in the body are validated and
//! written. Passwords are hashed before they reach the store and are never
//! returned.

use super::valid_email;
use crate::{
    auth::password::hash_password,
    users::{CreateOutcome, DynUserStore, NewUser, UpdateOutcome, UserChanges, UserRecord},
};
use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, error, info};
use utoipa::ToSchema;

const NAME_MAX_LEN: usize = 100;
const EMAIL_MAX_LEN: usize = 254;
const PASSWORD_MAX_LEN: usize = 128;

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const INVALID_EMAIL: &str = "Enter a valid email address.";
const EMAIL_TAKEN: &str = "user registration with this email already exists.";

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[schema(format = Password)]
    pub password: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UserUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[schema(format = Password)]
    pub password: Option<String>,
}

/// Field name to messages, serialized as the 400 response body.
#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn field(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }
}

#[derive(Debug)]
enum ServiceError {
    NotFound,
    Validation(ValidationErrors),
    Internal(anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({"error": "Not Found"}))).into_response()
            }
            Self::Validation(errors) => {
                debug!("Validation failed: {errors:?}");
                (StatusCode::BAD_REQUEST, Json(errors)).into_response()
            }
            Self::Internal(err) => {
                error!("Failed to handle user request: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| {
            ServiceError::Validation(ValidationErrors::field(
                "non_field_errors",
                rejection.body_text(),
            ))
        })
}

/// Trimmed, length-checked text field. `None` means the field was absent.
fn check_text(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<String>,
    max_len: usize,
    trim: bool,
) -> Option<String> {
    let value = value?;
    let value = if trim {
        value.trim().to_string()
    } else {
        value
    };
    if value.is_empty() {
        errors.add(field, BLANK);
        return None;
    }
    if value.chars().count() > max_len {
        errors.add(
            field,
            format!("Ensure this field has no more than {max_len} characters."),
        );
        return None;
    }
    Some(value)
}

fn check_email(errors: &mut ValidationErrors, value: Option<String>) -> Option<String> {
    let email = check_text(errors, "email", value, EMAIL_MAX_LEN, true)?;
    if valid_email(&email) {
        Some(email)
    } else {
        errors.add("email", INVALID_EMAIL);
        None
    }
}

fn require(errors: &mut ValidationErrors, field: &'static str, value: Option<String>) -> Option<String> {
    if value.is_none() {
        errors.add(field, REQUIRED);
    }
    value
}

fn hash(password: Option<String>) -> Result<Option<String>, ServiceError> {
    password
        .map(|password| hash_password(&password))
        .transpose()
        .map_err(ServiceError::Internal)
}

fn parse_id(id: &str) -> Result<i64, ServiceError> {
    id.trim().parse::<i64>().map_err(|_| ServiceError::NotFound)
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Invalid input, field errors", body = ValidationErrors),
    ),
    tag = "users"
)]
pub async fn register(
    store: Extension<DynUserStore>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Response {
    match register_user(&store, payload).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn register_user(
    store: &DynUserStore,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<UserResponse, ServiceError> {
    let request = json_body(payload)?;
    let mut errors = ValidationErrors::default();

    let first_name = require(&mut errors, "first_name", request.first_name);
    let first_name = check_text(&mut errors, "first_name", first_name, NAME_MAX_LEN, true);
    let last_name = require(&mut errors, "last_name", request.last_name);
    let last_name = check_text(&mut errors, "last_name", last_name, NAME_MAX_LEN, true);
    let email = require(&mut errors, "email", request.email);
    let email = check_email(&mut errors, email);
    let password = require(&mut errors, "password", request.password);
    let password = check_text(&mut errors, "password", password, PASSWORD_MAX_LEN, false);

    let (Some(first_name), Some(last_name), Some(email), Some(password)) =
        (first_name, last_name, email, password)
    else {
        return Err(ServiceError::Validation(errors));
    };

    let password_hash = hash(Some(password))?.unwrap_or_default();
    let new_user = NewUser {
        first_name,
        last_name,
        email,
        password_hash,
    };

    match store.create(new_user).await.map_err(ServiceError::Internal)? {
        CreateOutcome::Created(user) => {
            info!(user_id = user.id, "user registered");
            Ok(UserResponse::from(&user))
        }
        CreateOutcome::EmailTaken => Err(ServiceError::Validation(ValidationErrors::field(
            "email",
            EMAIL_TAKEN,
        ))),
    }
}

#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users ordered by id", body = [UserResponse]),
    ),
    tag = "users"
)]
pub async fn list_users(store: Extension<DynUserStore>) -> Response {
    match store.list().await {
        Ok(users) => {
            let body: Vec<UserResponse> = users.iter().map(UserResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => ServiceError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail", body = UserResponse),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn get_user(Path(id): Path<String>, store: Extension<DynUserStore>) -> Response {
    match find_user(&store, &id).await {
        Ok(user) => (StatusCode::OK, Json(UserResponse::from(&user))).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn find_user(store: &DynUserStore, id: &str) -> Result<UserRecord, ServiceError> {
    let id = parse_id(id)?;
    store
        .find_by_id(id)
        .await
        .map_err(ServiceError::Internal)?
        .ok_or(ServiceError::NotFound)
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Invalid input, field errors", body = ValidationErrors),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn update_user(
    Path(id): Path<String>,
    store: Extension<DynUserStore>,
    payload: Result<Json<UserUpdateRequest>, JsonRejection>,
) -> Response {
    match update_user_record(&store, &id, payload).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn update_user_record(
    store: &DynUserStore,
    id: &str,
    payload: Result<Json<UserUpdateRequest>, JsonRejection>,
) -> Result<UserResponse, ServiceError> {
    // An absent row is 404 whatever the body holds.
    let existing = find_user(store, id).await?;
    let request = json_body(payload)?;
    let mut errors = ValidationErrors::default();

    let first_name = check_text(&mut errors, "first_name", request.first_name, NAME_MAX_LEN, true);
    let last_name = check_text(&mut errors, "last_name", request.last_name, NAME_MAX_LEN, true);
    let email = check_email(&mut errors, request.email);
    let password = check_text(&mut errors, "password", request.password, PASSWORD_MAX_LEN, false);

    if !errors.is_empty() {
        return Err(ServiceError::Validation(errors));
    }

    let changes = UserChanges {
        first_name,
        last_name,
        email,
        password_hash: hash(password)?,
    };

    if changes.is_empty() {
        return Ok(UserResponse::from(&existing));
    }

    match store
        .update(existing.id, changes)
        .await
        .map_err(ServiceError::Internal)?
    {
        UpdateOutcome::Updated(user) => Ok(UserResponse::from(&user)),
        UpdateOutcome::NotFound => Err(ServiceError::NotFound),
        UpdateOutcome::EmailTaken => Err(ServiceError::Validation(ValidationErrors::field(
            "email",
            EMAIL_TAKEN,
        ))),
    }
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found"),
    ),
    tag = "users"
)]
pub async fn delete_user(Path(id): Path<String>, store: Extension<DynUserStore>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    match store.delete(id).await {
        Ok(true) => {
            info!(user_id = id, "user deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => ServiceError::NotFound.into_response(),
        Err(err) => ServiceError::Internal(err).into_response(),
    }
}
