use axum::{
    extract::{Path, Query, State},
    Extension,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::Like;
use crate::middleware::auth::AuthUser;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::pipeline::{Lookup, Page, PageParams, Pipeline, SortDirection};
use crate::state::AppState;

use super::comments::load_comment;
use super::users::PageQuery;
use super::videos::load_video;

/// POST /api/v1/likes/toggle/v/:videoId - Toggle a video like
///
/// A user holds at most one like per video; liking again removes it.
pub async fn toggle_video_like(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Value> {
    load_video(&state, video_id).await?;

    let removed = sqlx::query("DELETE FROM likes WHERE liked_by = $1 AND video_id = $2")
        .bind(auth.id)
        .bind(video_id)
        .execute(&state.pool)
        .await?;

    if removed.rows_affected() > 0 {
        return Ok(ApiResponse::success(
            json!({ "liked": false }),
            "Video like removed",
        ));
    }

    let like: Like = sqlx::query_as(
        "INSERT INTO likes (video_id, liked_by) VALUES ($1, $2) RETURNING *",
    )
    .bind(video_id)
    .bind(auth.id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        json!({ "liked": true, "like": like }),
        "Video liked",
    ))
}

/// POST /api/v1/likes/toggle/c/:commentId - Toggle a comment like
pub async fn toggle_comment_like(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<Value> {
    load_comment(&state, comment_id).await?;

    let removed = sqlx::query("DELETE FROM likes WHERE liked_by = $1 AND comment_id = $2")
        .bind(auth.id)
        .bind(comment_id)
        .execute(&state.pool)
        .await?;

    if removed.rows_affected() > 0 {
        return Ok(ApiResponse::success(
            json!({ "liked": false }),
            "Comment like removed",
        ));
    }

    let like: Like = sqlx::query_as(
        "INSERT INTO likes (comment_id, liked_by) VALUES ($1, $2) RETURNING *",
    )
    .bind(comment_id)
    .bind(auth.id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        json!({ "liked": true, "like": like }),
        "Comment liked",
    ))
}

/// GET /api/v1/likes/videos - Videos the requester has liked
///
/// Video-likes only (comment-likes excluded), each joined to the video and
/// the video's owner summary, paginated.
pub async fn liked_videos(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<Value>> {
    let page = Pipeline::new("likes")?
        .match_id("liked_by", auth.id)?
        .match_not_null("video_id")?
        .sort("created_at", SortDirection::Desc)?
        .lookup(
            Lookup::new("videos", "video_id", "id", "video")
                .project(&[
                    "id",
                    "title",
                    "thumbnail_url",
                    "video_url",
                    "duration",
                    "views",
                    "created_at",
                ])
                .nested(
                    Lookup::new("users", "owner_id", "id", "owner")
                        .project(&["id", "username", "email", "avatar_url"]),
                ),
        )?
        .paginate(PageParams::from_query(query.page, query.limit))
        .fetch_page(&state.pool)
        .await?;

    Ok(ApiResponse::success(page, "All liked videos fetched"))
}
