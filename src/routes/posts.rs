use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use super::upload_error;
use crate::db::models::{Category, NewPost, Post, PostChanges};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, FormData};
use crate::media::THUMBNAIL_MAX_BYTES;
use crate::state::AppState;

const MIN_DESCRIPTION_LEN: usize = 12;
const THUMBNAIL_TOO_BIG: &str = "Thumbnail is too big. Make it less than 2MB";

// --- Router ---

pub fn router() -> Router<AppState> {
    let collection = get(list_posts).post(create_post);

    Router::new()
        .route("/api/posts", collection.clone())
        .route("/api/posts/", collection)
        .route(
            "/api/posts/{id}",
            get(get_post).patch(edit_post).delete(delete_post),
        )
        .route("/api/posts/categories/{category}", get(list_by_category))
        .route("/api/posts/users/{id}", get(list_by_user))
}

// --- Handlers ---

async fn create_post(
    current: CurrentUser,
    State(state): State<AppState>,
    mut form: FormData,
) -> AppResult<(StatusCode, Json<Post>)> {
    let thumbnail = form.take_file("thumbnail");
    let (Some(title), Some(category), Some(description), Some(thumbnail)) = (
        form.text("title"),
        form.text("category"),
        form.text("description"),
        thumbnail,
    ) else {
        return Err(AppError::Validation(
            "Please fill in all fields and choose a thumbnail".into(),
        ));
    };

    if state.users.find_by_id(&current.id).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }

    let staged = state
        .media
        .stage(&thumbnail, THUMBNAIL_MAX_BYTES, None)
        .await
        .map_err(upload_error(THUMBNAIL_TOO_BIG))?;

    let new_post = NewPost {
        title: title.to_string(),
        category: Category::from_name_or_default(category),
        description: description.to_string(),
        creator: current.id.clone(),
        thumbnail: staged.filename().to_string(),
    };

    match state.posts.create(new_post).await {
        Ok(post) => {
            staged.commit().await;
            tracing::info!(post_id = %post.id, creator = %post.creator, "created post");
            Ok((StatusCode::CREATED, Json(post)))
        }
        Err(e) => {
            staged.rollback().await;
            Err(e.into())
        }
    }
}

async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<Post>>> {
    Ok(Json(state.posts.list_recent().await?))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let post = state
        .posts
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".into()))?;
    Ok(Json(post))
}

/// An empty category is a normal answer, not an error.
async fn list_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> AppResult<Json<Vec<Post>>> {
    let posts = match category.parse::<Category>() {
        Ok(category) => state.posts.list_by_category(category).await?,
        Err(_) => {
            tracing::debug!(%category, "listing unknown category");
            Vec::new()
        }
    };
    Ok(Json(posts))
}

/// Unlike categories, a user without posts is reported as 404.
async fn list_by_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Post>>> {
    let posts = state.posts.list_by_creator(&id).await?;
    if posts.is_empty() {
        return Err(AppError::NotFound("No posts found for this user.".into()));
    }
    Ok(Json(posts))
}

async fn edit_post(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut form: FormData,
) -> AppResult<Json<Post>> {
    let (Some(title), Some(category), Some(description)) = (
        form.text("title"),
        form.text("category"),
        form.text("description"),
    ) else {
        return Err(AppError::Validation("Please fill in all fields".into()));
    };
    if description.chars().count() < MIN_DESCRIPTION_LEN {
        return Err(AppError::Validation(
            "Description should be at least 12 characters".into(),
        ));
    }

    let changes = PostChanges {
        title: title.to_string(),
        category: Category::from_name_or_default(category),
        description: description.to_string(),
        thumbnail: None,
    };

    let post = existing_post(&state, &id).await?;

    let Some(thumbnail) = form.take_file("thumbnail") else {
        let updated = state
            .posts
            .update(&post.id, changes)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".into()))?;
        tracing::info!(post_id = %updated.id, editor = %current.id, "edited post");
        return Ok(Json(updated));
    };

    let replaces = Some(post.thumbnail.as_str()).filter(|t| !t.is_empty());
    let staged = state
        .media
        .stage(&thumbnail, THUMBNAIL_MAX_BYTES, replaces)
        .await
        .map_err(upload_error(THUMBNAIL_TOO_BIG))?;

    let changes = PostChanges {
        thumbnail: Some(staged.filename().to_string()),
        ..changes
    };

    match state.posts.update(&post.id, changes).await {
        Ok(Some(updated)) => {
            staged.commit().await;
            tracing::info!(
                post_id = %updated.id,
                editor = %current.id,
                "edited post with new thumbnail"
            );
            Ok(Json(updated))
        }
        Ok(None) => {
            staged.rollback().await;
            Err(AppError::NotFound("Post not found".into()))
        }
        Err(e) => {
            staged.rollback().await;
            Err(e.into())
        }
    }
}

async fn delete_post(
    current: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let post = existing_post(&state, &id).await?;

    // The file goes first; the record is only removed once it is gone.
    if !post.thumbnail.is_empty() {
        state.media.discard(&post.thumbnail).await?;
    }

    state
        .posts
        .delete(&post.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".into()))?;

    tracing::info!(post_id = %post.id, creator = %post.creator, by = %current.id, "deleted post");
    Ok(Json(json!({
        "message": format!("Post {} deleted successfully.", post.id)
    })))
}

/// `creator` is a weak reference: any signed-in user may change a post.
async fn existing_post(state: &AppState, id: &str) -> AppResult<Post> {
    state
        .posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".into()))
}
