//! Comment passthroughs to the tracker.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use issuetree_core::tracker::Comment;

use super::error::ApiError;
use crate::state::AppState;

/// Request body for creating or editing a comment
#[derive(Debug, Deserialize)]
pub struct CommentBody {
    #[serde(default)]
    pub content: String,
}

impl CommentBody {
    fn validated(&self) -> Result<&str, ApiError> {
        if self.content.trim().is_empty() {
            return Err(ApiError::invalid_argument("comment content must not be empty"));
        }
        Ok(&self.content)
    }
}

/// List comments on a ticket, oldest first
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let comments = state.gateway().list_comments(number).await?;
    Ok(Json(comments))
}

/// Add a comment to a ticket
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Path(number): Path<u64>,
    Json(body): Json<CommentBody>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let content = body.validated()?;
    let comment = state.gateway().create_comment(number, content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Replace a comment's content
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(body): Json<CommentBody>,
) -> Result<Json<Comment>, ApiError> {
    let content = body.validated()?;
    let comment = state.gateway().update_comment(id, content).await?;
    Ok(Json(comment))
}

/// Delete a comment
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    state.gateway().delete_comment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
