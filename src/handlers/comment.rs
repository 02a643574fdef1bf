// src/handlers/comment.rs

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::comment::{CommentTreeParams, CreateCommentRequest},
    services::comment::CommentService,
    utils::html::clean_html,
};

/// Create a new comment.
/// `id` in the body names the comment being replied to; absent or 0 starts a new thread.
pub async fn create_comment(
    State(comments): State<CommentService>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;

    // 1. Validate payload
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    // 2. Sanitize; markup-only content leaves nothing to store
    let content = clean_html(&payload.content);
    if content.is_empty() {
        return Err(AppError::BadRequest(
            "Comment has no displayable content".to_string(),
        ));
    }

    // 3. Insert
    let id = comments.create_comment(&content, payload.id).await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Fetch comment trees.
/// `?parent={id}` returns that comment with all replies; without it, the whole forest.
pub async fn list_comments(
    State(comments): State<CommentService>,
    params: Result<Query<CommentTreeParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = params?;

    let forest = comments.comment_tree(params.parent.unwrap_or(0)).await?;

    Ok(Json(forest))
}

/// Fetch a single comment with its replies nested under it.
pub async fn get_comment(
    State(comments): State<CommentService>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = id?;

    let node = comments.comment(id).await?;

    Ok(Json(node))
}

/// Delete a comment and every reply below it.
pub async fn delete_comment(
    State(comments): State<CommentService>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = id?;

    comments.delete_subtree(id).await?;

    Ok(StatusCode::OK)
}
