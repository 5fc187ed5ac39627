use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::access::ensure_owner;
use crate::database::models::Playlist;
use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::pipeline::{Lookup, ManyLookup, Page, PageParams, Pipeline, SortDirection};
use crate::state::AppState;

use super::users::PageQuery;
use super::videos::load_video;

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlaylistRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// POST /api/v1/playlists - Create a playlist owned by the requester
pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreatePlaylistRequest>,
) -> ApiResult<Playlist> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(ApiError::validation(
            "Title is required for playlist",
            vec!["title must not be empty".to_string()],
        ));
    }

    let playlist: Playlist = sqlx::query_as(
        "INSERT INTO playlists (title, description, owner_id) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(title)
    .bind(payload.description.as_deref())
    .bind(auth.id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::created(playlist, "Playlist created successfully"))
}

/// GET /api/v1/playlists/:playlistId - Fetch one playlist
///
/// The playlist's video references are joined to video documents in list
/// order, each with its owner summary.
pub async fn get(
    State(state): State<AppState>,
    Path(playlist_id): Path<Uuid>,
) -> ApiResult<Value> {
    let doc = playlist_pipeline()?
        .match_id("id", playlist_id)?
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;

    Ok(ApiResponse::success(doc, "Playlist fetched successfully"))
}

/// GET /api/v1/playlists/user/:userId - Playlists owned by a user
pub async fn list_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<Value>> {
    let page = playlist_pipeline()?
        .match_id("owner_id", user_id)?
        .sort("created_at", SortDirection::Desc)?
        .paginate(PageParams::from_query(query.page, query.limit))
        .fetch_page(&state.pool)
        .await?;

    Ok(ApiResponse::success(page, "All playlists fetched successfully"))
}

/// PATCH /api/v1/playlists/:playlistId - Owner-only rename/describe
pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(playlist_id): Path<Uuid>,
    Json(payload): Json<UpdatePlaylistRequest>,
) -> ApiResult<Playlist> {
    if payload.title.is_none() && payload.description.is_none() {
        return Err(ApiError::validation(
            "Nothing to update",
            vec!["title or description is required".to_string()],
        ));
    }

    let playlist = load_playlist(&state, playlist_id).await?;
    ensure_owner(&playlist, auth.id)?;

    let playlist: Playlist = sqlx::query_as(
        "UPDATE playlists SET title = COALESCE($1, title), \
         description = COALESCE($2, description), updated_at = now() \
         WHERE id = $3 RETURNING *",
    )
    .bind(payload.title.as_deref())
    .bind(payload.description.as_deref())
    .bind(playlist_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(playlist, "Playlist updated successfully"))
}

/// DELETE /api/v1/playlists/:playlistId - Owner-only delete
pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(playlist_id): Path<Uuid>,
) -> ApiResult<Value> {
    let playlist = load_playlist(&state, playlist_id).await?;
    ensure_owner(&playlist, auth.id)?;

    sqlx::query("DELETE FROM playlists WHERE id = $1")
        .bind(playlist_id)
        .execute(&state.pool)
        .await?;

    Ok(ApiResponse::success(json!({}), "Playlist deleted successfully"))
}

/// PATCH /api/v1/playlists/add/:playlistId/:videoId - Owner-only append
///
/// Appends to the end of the playlist; adding a video that is already in
/// the playlist is a no-op rather than a duplicate.
pub async fn add_video(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((playlist_id, video_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Value> {
    let playlist = load_playlist(&state, playlist_id).await?;
    ensure_owner(&playlist, auth.id)?;
    load_video(&state, video_id).await?;

    sqlx::query(
        "INSERT INTO playlist_videos (playlist_id, video_id, position) \
         VALUES ($1, $2, (SELECT COALESCE(MAX(position) + 1, 0) FROM playlist_videos WHERE playlist_id = $1)) \
         ON CONFLICT (playlist_id, video_id) DO NOTHING",
    )
    .bind(playlist_id)
    .bind(video_id)
    .execute(&state.pool)
    .await?;

    let doc = playlist_pipeline()?
        .match_id("id", playlist_id)?
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;

    Ok(ApiResponse::success(doc, "Video added to playlist"))
}

/// PATCH /api/v1/playlists/remove/:playlistId/:videoId - Owner-only removal
pub async fn remove_video(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((playlist_id, video_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Value> {
    let playlist = load_playlist(&state, playlist_id).await?;
    ensure_owner(&playlist, auth.id)?;

    sqlx::query("DELETE FROM playlist_videos WHERE playlist_id = $1 AND video_id = $2")
        .bind(playlist_id)
        .bind(video_id)
        .execute(&state.pool)
        .await?;

    Ok(ApiResponse::success(json!({}), "Video removed from playlist"))
}

/// Playlist documents always carry their videos joined in list order.
fn playlist_pipeline() -> Result<Pipeline, ApiError> {
    Ok(Pipeline::new("playlists")?.lookup_many(
        ManyLookup::new("playlist_videos", "playlist_id", "video_id", "videos", "videos")
            .project(&[
                "id",
                "title",
                "thumbnail_url",
                "description",
                "duration",
                "views",
            ])
            .order_by("position")
            .nested(
                Lookup::new("users", "owner_id", "id", "owner")
                    .project(&["id", "username", "fullname", "avatar_url"]),
            ),
    )?)
}

async fn load_playlist(state: &AppState, playlist_id: Uuid) -> Result<Playlist, ApiError> {
    let playlist: Option<Playlist> = sqlx::query_as("SELECT * FROM playlists WHERE id = $1")
        .bind(playlist_id)
        .fetch_optional(&state.pool)
        .await?;
    playlist.ok_or_else(|| ApiError::not_found("Playlist not found"))
}
