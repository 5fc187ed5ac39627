use axum::{
    extract::{Multipart, Path, Query, State},
    Extension,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::access::ensure_owner;
use crate::database::models::Video;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::pipeline::{Lookup, Page, PageParams, Pipeline, SortDirection};
use crate::state::AppState;

use super::{read_multipart, require_text};

/// Sort fields a caller may pick for video listings. Anything else is a 400
/// rather than a probe into arbitrary columns.
const SORTABLE: &[&str] = &["created_at", "title", "duration", "views"];

#[derive(Debug, Deserialize)]
pub struct ListVideosQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Free-text title filter, case-insensitive substring
    pub query: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortType")]
    pub sort_type: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<Uuid>,
}

pub(crate) fn sort_column(requested: Option<&str>, allowed: &[&str]) -> Result<String, ApiError> {
    match requested {
        None => Ok("created_at".to_string()),
        Some(col) if allowed.contains(&col) => Ok(col.to_string()),
        Some(col) => Err(ApiError::bad_request(format!(
            "Unsupported sort field: {}",
            col
        ))),
    }
}

/// GET /api/v1/videos - List videos
///
/// Optional free-text title match and owner filter; caller-chosen sort
/// (default creation time ascending, descending on request); each result
/// joined with the owner's public summary; paginated.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListVideosQuery>,
) -> ApiResult<Page<Value>> {
    let sort_by = sort_column(query.sort_by.as_deref(), SORTABLE)?;
    let direction = SortDirection::from_query(query.sort_type.as_deref());

    let mut pipeline = Pipeline::new("videos")?.match_flag("is_published", true)?;
    if let Some(text) = query.query.as_deref().filter(|t| !t.trim().is_empty()) {
        pipeline = pipeline.match_contains("title", text.trim())?;
    }
    if let Some(owner) = query.user_id {
        pipeline = pipeline.match_id("owner_id", owner)?;
    }
    let page = pipeline
        .sort(&sort_by, direction)?
        .lookup(
            Lookup::new("users", "owner_id", "id", "owner")
                .project(&["id", "username", "fullname", "avatar_url"]),
        )?
        .paginate(PageParams::from_query(query.page, query.limit))
        .fetch_page(&state.pool)
        .await?;

    Ok(ApiResponse::success(page, "All videos fetched successfully"))
}

/// POST /api/v1/videos - Upload a video
///
/// Multipart body: `title`, optional `description`, a `video` file and a
/// `thumbnail` file. Both files go through the upload proxy; a proxy
/// failure is a 400, not a 500. The upload-then-insert sequence is not
/// compensated: if the insert fails the stored media is orphaned and
/// logged.
pub async fn upload(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> ApiResult<Video> {
    let (texts, mut files) = read_multipart(multipart).await?;
    let title = require_text(&texts, "title")?.to_string();
    let description = texts.get("description").map(|s| s.trim().to_string());

    let video_file = files
        .remove("video")
        .ok_or_else(|| ApiError::bad_request("Video file is required"))?;
    let thumbnail_file = files
        .remove("thumbnail")
        .ok_or_else(|| ApiError::bad_request("Thumbnail file is required"))?;

    let staged_video = state
        .media
        .stage(video_file.filename.as_deref(), &video_file.bytes)
        .await?;
    let stored_video = state
        .media
        .store(&staged_video)
        .await
        .ok_or_else(|| ApiError::bad_request("Video file could not be stored"))?;

    let staged_thumb = state
        .media
        .stage(thumbnail_file.filename.as_deref(), &thumbnail_file.bytes)
        .await?;
    let stored_thumb = state
        .media
        .store(&staged_thumb)
        .await
        .ok_or_else(|| ApiError::bad_request("Thumbnail could not be stored"))?;

    let video: Video = sqlx::query_as(
        "INSERT INTO videos (video_url, thumbnail_url, title, description, duration, owner_id) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(&stored_video.url)
    .bind(&stored_thumb.url)
    .bind(&title)
    .bind(description.as_deref())
    .bind(stored_video.duration)
    .bind(auth.id)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        tracing::warn!(
            "video record insert failed; stored media orphaned at {} / {}",
            stored_video.url,
            stored_thumb.url
        );
        ApiError::from(e)
    })?;

    Ok(ApiResponse::created(video, "Video uploaded successfully"))
}

/// GET /api/v1/videos/:videoId - Fetch one video
///
/// Increments the view counter, records the view in the requester's watch
/// history, and returns the video joined with its owner summary.
pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Value> {
    let updated = sqlx::query("UPDATE videos SET views = views + 1 WHERE id = $1")
        .bind(video_id)
        .execute(&state.pool)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Video not found"));
    }

    // Re-watching refreshes the entry's place in the history
    sqlx::query(
        "INSERT INTO watch_history (user_id, video_id) VALUES ($1, $2) \
         ON CONFLICT (user_id, video_id) DO UPDATE SET watched_at = now()",
    )
    .bind(auth.id)
    .bind(video_id)
    .execute(&state.pool)
    .await?;

    let doc = Pipeline::new("videos")?
        .match_id("id", video_id)?
        .lookup(
            Lookup::new("users", "owner_id", "id", "owner")
                .project(&["id", "username", "fullname", "avatar_url"]),
        )?
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;

    Ok(ApiResponse::success(doc, "Video fetched successfully"))
}

/// PATCH /api/v1/videos/:videoId - Update title/description/thumbnail
///
/// Owner-only. Multipart body with optional `title` and `description` text
/// fields and an optional `thumbnail` file.
pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(video_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Video> {
    let video = load_video(&state, video_id).await?;
    ensure_owner(&video, auth.id)?;

    let (texts, mut files) = read_multipart(multipart).await?;
    let title = texts.get("title").map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let description = texts.get("description").map(|s| s.trim().to_string());

    let thumbnail_url = match files.remove("thumbnail") {
        Some(file) => {
            let staged = state.media.stage(file.filename.as_deref(), &file.bytes).await?;
            let stored = state
                .media
                .store(&staged)
                .await
                .ok_or_else(|| ApiError::bad_request("Thumbnail could not be stored"))?;
            Some(stored.url)
        }
        None => None,
    };

    if title.is_none() && description.is_none() && thumbnail_url.is_none() {
        return Err(ApiError::validation(
            "Nothing to update",
            vec!["title, description or thumbnail is required".to_string()],
        ));
    }

    let video: Video = sqlx::query_as(
        "UPDATE videos SET title = COALESCE($1, title), description = COALESCE($2, description), \
         thumbnail_url = COALESCE($3, thumbnail_url), updated_at = now() WHERE id = $4 RETURNING *",
    )
    .bind(title.as_deref())
    .bind(description.as_deref())
    .bind(thumbnail_url.as_deref())
    .bind(video_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(video, "Video updated successfully"))
}

/// DELETE /api/v1/videos/:videoId - Owner-only delete
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Value> {
    let video = load_video(&state, video_id).await?;
    ensure_owner(&video, auth.id)?;

    sqlx::query("DELETE FROM videos WHERE id = $1")
        .bind(video_id)
        .execute(&state.pool)
        .await?;

    Ok(ApiResponse::success(json!({}), "Video deleted successfully"))
}

/// PATCH /api/v1/videos/:videoId/toggle-publish - Owner-only publish flip
pub async fn toggle_publish(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Video> {
    let video = load_video(&state, video_id).await?;
    ensure_owner(&video, auth.id)?;

    let video: Video = sqlx::query_as(
        "UPDATE videos SET is_published = NOT is_published, updated_at = now() \
         WHERE id = $1 RETURNING *",
    )
    .bind(video_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(video, "Publish status toggled"))
}

pub(crate) async fn load_video(state: &AppState, video_id: Uuid) -> Result<Video, ApiError> {
    let video: Option<Video> = sqlx::query_as("SELECT * FROM videos WHERE id = $1")
        .bind(video_id)
        .fetch_optional(&state.pool)
        .await?;
    video.ok_or_else(|| ApiError::not_found("Video not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sort_is_created_at() {
        assert_eq!(sort_column(None, SORTABLE).unwrap(), "created_at");
    }

    #[test]
    fn whitelisted_sort_passes() {
        assert_eq!(sort_column(Some("views"), SORTABLE).unwrap(), "views");
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let err = sort_column(Some("password_hash"), SORTABLE).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
