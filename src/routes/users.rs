use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::upload_error;
use crate::auth::password;
use crate::db::models::{NewUser, User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, FormData, JsonBody};
use crate::media::AVATAR_MAX_BYTES;
use crate::state::AppState;

/// Shortest accepted password, counted after trimming.
const MIN_PASSWORD_LEN: usize = 6;

// --- Requests / responses ---

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "password2")]
    pub confirm_password: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub id: String,
    pub name: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EditUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_new_password: Option<String>,
}

fn filled(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_authors))
        .route("/api/users/", get(list_authors))
        .route("/api/users/register", post(register))
        .route("/api/users/login", post(login))
        .route("/api/users/change-avatar", post(change_avatar))
        .route("/api/users/edit-user", patch(edit_user))
        .route("/api/users/{id}", get(get_user))
}

// --- Handlers ---

async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let (Some(name), Some(email), Some(password), Some(confirm)) = (
        filled(&req.name),
        filled(&req.email),
        filled(&req.password),
        filled(&req.confirm_password),
    ) else {
        return Err(AppError::Validation("Fill in all fields.".into()));
    };

    let email = email.to_lowercase();
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already exists".into()));
    }

    if password != confirm {
        return Err(AppError::Validation("Passwords do not match".into()));
    }

    if password.trim().chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(
            "Password should be at least 6 characters".into(),
        ));
    }

    let password_hash =
        password::hash(password).map_err(|e| AppError::Internal(e.to_string()))?;

    let user = state
        .users
        .create(NewUser {
            name: name.to_string(),
            email,
            password_hash,
        })
        .await?;

    tracing::info!(user_id = %user.id, "registered user");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (Some(email), Some(password)) = (filled(&req.email), filled(&req.password)) else {
        return Err(AppError::Validation("Fill in all fields.".into()));
    };

    // Same answer for unknown email and wrong password.
    let invalid = || AppError::Validation("Invalid credentials".into());

    let user = state
        .users
        .find_by_email(&email.to_lowercase())
        .await?
        .ok_or_else(invalid)?;

    if !password::verify(password, &user.password_hash) {
        return Err(invalid());
    }

    let token = state
        .tokens
        .issue(&user.id, &user.name)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        token,
        id: user.id,
        name: user.name,
    }))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let user = state
        .users
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

async fn list_authors(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.users.list().await?))
}

async fn change_avatar(
    current: CurrentUser,
    State(state): State<AppState>,
    mut form: FormData,
) -> AppResult<Json<User>> {
    let avatar = form
        .take_file("avatar")
        .ok_or_else(|| AppError::Validation("Please choose an image".into()))?;

    let user = state
        .users
        .find_by_id(&current.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let staged = state
        .media
        .stage(&avatar, AVATAR_MAX_BYTES, user.avatar.as_deref())
        .await
        .map_err(upload_error(
            "Profile picture is too large. Please use an image less than 500kb",
        ))?;

    match state.users.set_avatar(&user.id, staged.filename()).await {
        Ok(Some(updated)) => {
            staged.commit().await;
            tracing::info!(user_id = %updated.id, "changed avatar");
            Ok(Json(updated))
        }
        Ok(None) => {
            staged.rollback().await;
            Err(AppError::NotFound("User not found".into()))
        }
        Err(e) => {
            staged.rollback().await;
            Err(e.into())
        }
    }
}

async fn edit_user(
    current: CurrentUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<EditUserRequest>,
) -> AppResult<Json<User>> {
    let (Some(name), Some(email), Some(current_password), Some(new_password)) = (
        filled(&req.name),
        filled(&req.email),
        filled(&req.current_password),
        filled(&req.new_password),
    ) else {
        return Err(AppError::Validation("Fill in all fields.".into()));
    };

    let user = state
        .users
        .find_by_id(&current.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let email = email.to_lowercase();
    if let Some(other) = state.users.find_by_email(&email).await? {
        if other.id != user.id {
            return Err(AppError::Conflict("Email already exists".into()));
        }
    }

    if !password::verify(current_password, &user.password_hash) {
        return Err(AppError::Validation("Invalid current password".into()));
    }

    if req.confirm_new_password.as_deref() != Some(new_password) {
        return Err(AppError::Validation("Passwords do not match".into()));
    }

    let password_hash =
        password::hash(new_password).map_err(|e| AppError::Internal(e.to_string()))?;

    let updated = state
        .users
        .update_profile(&user.id, name, &email, &password_hash)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    tracing::info!(user_id = %updated.id, "updated profile");
    Ok(Json(updated))
}
