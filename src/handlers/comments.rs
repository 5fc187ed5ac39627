use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::access::ensure_owner;
use crate::database::models::Comment;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::pipeline::{Lookup, Page, PageParams, Pipeline, SortDirection};
use crate::state::AppState;

use super::videos::load_video;

const SORTABLE: &[&str] = &["created_at"];

#[derive(Debug, Deserialize)]
pub struct ListCommentsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortType")]
    pub sort_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

/// GET /api/v1/comments/:videoId - Comments on a video
///
/// Paginated, each comment joined with a video summary (title, thumbnail)
/// and an owner summary (username, avatar, fullname).
pub async fn list(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
    Query(query): Query<ListCommentsQuery>,
) -> ApiResult<Page<Value>> {
    let sort_by = super::videos::sort_column(query.sort_by.as_deref(), SORTABLE)?;
    let direction = SortDirection::from_query(query.sort_type.as_deref());

    let page = Pipeline::new("comments")?
        .match_id("video_id", video_id)?
        .sort(&sort_by, direction)?
        .lookup(
            Lookup::new("videos", "video_id", "id", "video")
                .project(&["id", "title", "thumbnail_url"]),
        )?
        .lookup(
            Lookup::new("users", "owner_id", "id", "owner")
                .project(&["id", "username", "avatar_url", "fullname"]),
        )?
        .paginate(PageParams::from_query(query.page, query.limit))
        .fetch_page(&state.pool)
        .await?;

    Ok(ApiResponse::success(page, "Video comments fetched"))
}

/// POST /api/v1/comments/:videoId - Add a comment
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(video_id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> ApiResult<Comment> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation(
            "Comment is required",
            vec!["content must not be empty".to_string()],
        ));
    }

    load_video(&state, video_id).await?;

    let comment: Comment = sqlx::query_as(
        "INSERT INTO comments (content, video_id, owner_id) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(content)
    .bind(video_id)
    .bind(auth.id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::created(comment, "Comment added successfully"))
}

/// PATCH /api/v1/comments/c/:commentId - Owner-only edit
pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(comment_id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> ApiResult<Comment> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation(
            "Comment is required",
            vec!["content must not be empty".to_string()],
        ));
    }

    let comment = load_comment(&state, comment_id).await?;
    ensure_owner(&comment, auth.id)?;

    let comment: Comment = sqlx::query_as(
        "UPDATE comments SET content = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(content)
    .bind(comment_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(comment, "Comment updated successfully"))
}

/// DELETE /api/v1/comments/c/:commentId - Owner-only delete
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<Value> {
    let comment = load_comment(&state, comment_id).await?;
    ensure_owner(&comment, auth.id)?;

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(&state.pool)
        .await?;

    Ok(ApiResponse::success(json!({}), "Comment deleted successfully"))
}

pub(crate) async fn load_comment(
    state: &AppState,
    comment_id: Uuid,
) -> Result<Comment, ApiError> {
    let comment: Option<Comment> = sqlx::query_as("SELECT * FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_optional(&state.pool)
        .await?;
    comment.ok_or_else(|| ApiError::not_found("Comment not found"))
}
