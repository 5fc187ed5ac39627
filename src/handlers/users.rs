use axum::{
    extract::{Multipart, Path, Query, State},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::database::models::{User, UserPublic};
use crate::error::ApiError;
use crate::middleware::auth::{AuthUser, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::middleware::response::{ApiResponse, ApiResult};
use crate::pipeline::{Lookup, Page, PageParams, Pipeline, SortDirection};
use crate::state::AppState;

use super::{is_unique_violation, read_multipart, require_text};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(rename = "oldPassword")]
    pub old_password: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub fullname: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// POST /api/v1/users/register - Create an account
///
/// Multipart body: `username`, `email`, `fullname`, `password` text fields,
/// an `avatar` file (required) and an optional `coverImage` file. Files are
/// staged locally and forwarded to the media host before the row is created.
/// Responds 201 with the sanitized user; 409 when username or email is
/// taken; 400 when the avatar cannot be stored.
pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<UserPublic> {
    let (texts, mut files) = read_multipart(multipart).await?;
    let username = require_text(&texts, "username")?.to_string();
    let email = require_text(&texts, "email")?.to_string();
    let fullname = require_text(&texts, "fullname")?.to_string();
    let password = require_text(&texts, "password")?.to_string();

    let existing: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE username = $1 OR email = $2")
            .bind(&username)
            .bind(&email)
            .fetch_optional(&state.pool)
            .await?;
    if existing.is_some() {
        return Err(ApiError::conflict(
            "User with this email or username already exists",
        ));
    }

    let avatar_file = files
        .remove("avatar")
        .ok_or_else(|| ApiError::bad_request("User avatar is required"))?;
    let staged = state
        .media
        .stage(avatar_file.filename.as_deref(), &avatar_file.bytes)
        .await?;
    let avatar = state
        .media
        .store(&staged)
        .await
        .ok_or_else(|| ApiError::bad_request("Avatar could not be stored"))?;

    // Cover image is optional and a failed store degrades to no cover
    let cover_image_url = match files.remove("coverImage") {
        Some(file) => {
            let staged = state.media.stage(file.filename.as_deref(), &file.bytes).await?;
            state
                .media
                .store(&staged)
                .await
                .map(|m| m.url)
                .unwrap_or_default()
        }
        None => String::new(),
    };

    let password_hash = hash_password(&password)?;
    let user: User = sqlx::query_as(
        "INSERT INTO users (username, email, fullname, password_hash, avatar_url, cover_image_url) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(&username)
    .bind(&email)
    .bind(&fullname)
    .bind(&password_hash)
    .bind(&avatar.url)
    .bind(&cover_image_url)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::conflict("User with this email or username already exists")
        } else {
            ApiError::from(e)
        }
    })?;

    Ok(ApiResponse::created(
        UserPublic::from(user),
        "User registered successfully",
    ))
}

/// POST /api/v1/users/login - Authenticate and receive the cookie pair
///
/// Accepts username or email plus password. On success sets the
/// `accessToken`/`refreshToken` cookies (httpOnly, secure) and returns the
/// same tokens in the envelope; on bad credentials responds 401 with no
/// cookies.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<Value>), ApiError> {
    if payload.username.is_none() && payload.email.is_none() {
        return Err(ApiError::validation(
            "Missing credentials",
            vec!["username or email is required".to_string()],
        ));
    }

    let user: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE username = $1 OR email = $2")
            .bind(payload.username.as_deref().unwrap_or_default())
            .bind(payload.email.as_deref().unwrap_or_default())
            .fetch_optional(&state.pool)
            .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User does not exist"))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Incorrect credentials"));
    }

    let (access_token, refresh_token) = issue_token_pair(&state, user.id).await?;
    let jar = with_auth_cookies(jar, &access_token, &refresh_token);

    Ok((
        jar,
        ApiResponse::success(
            json!({
                "user": UserPublic::from(user),
                "accessToken": access_token,
                "refreshToken": refresh_token,
            }),
            "User logged in successfully",
        ),
    ))
}

/// POST /api/v1/users/refresh - Rotate the refresh token
///
/// Reads the refresh token from the `refreshToken` cookie or the body.
/// The presented token must match the single active token stored on the
/// user row; on success a new pair is issued and persisted, which retires
/// the presented token.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, ApiResponse<Value>), ApiError> {
    let incoming = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token))
        .ok_or_else(|| ApiError::unauthorized("Refresh token is required"))?;

    let claims = state.tokens.verify_refresh_token(&incoming)?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(claims.sub)
        .fetch_optional(&state.pool)
        .await?;
    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    if !refresh_token_is_current(user.refresh_token.as_deref(), &incoming) {
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let (access_token, refresh_token) = issue_token_pair(&state, user.id).await?;
    let jar = with_auth_cookies(jar, &access_token, &refresh_token);

    Ok((
        jar,
        ApiResponse::success(
            json!({
                "accessToken": access_token,
                "refreshToken": refresh_token,
            }),
            "Access token refreshed",
        ),
    ))
}

/// POST /api/v1/users/logout - Clear the session
///
/// Clears both cookies and the stored refresh token. Idempotent: logging
/// out twice succeeds both times.
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<Value>), ApiError> {
    sqlx::query("UPDATE users SET refresh_token = NULL, updated_at = now() WHERE id = $1")
        .bind(auth.id)
        .execute(&state.pool)
        .await?;

    let jar = without_auth_cookies(jar);
    Ok((jar, ApiResponse::success(json!({}), "Logout successful")))
}

/// POST /api/v1/users/change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Value> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(auth.id)
        .fetch_one(&state.pool)
        .await?;

    if !verify_password(&payload.old_password, &user.password_hash) {
        return Err(ApiError::bad_request("Invalid old password"));
    }

    let password_hash = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
        .bind(&password_hash)
        .bind(auth.id)
        .execute(&state.pool)
        .await?;

    Ok(ApiResponse::success(json!({}), "Password changed successfully"))
}

/// PATCH /api/v1/users/update-account
pub async fn update_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UpdateAccountRequest>,
) -> ApiResult<UserPublic> {
    if payload.fullname.is_none() && payload.email.is_none() {
        return Err(ApiError::validation(
            "Nothing to update",
            vec!["fullname or email is required".to_string()],
        ));
    }

    let user: User = sqlx::query_as(
        "UPDATE users SET fullname = COALESCE($1, fullname), email = COALESCE($2, email), \
         updated_at = now() WHERE id = $3 RETURNING *",
    )
    .bind(payload.fullname.as_deref())
    .bind(payload.email.as_deref())
    .bind(auth.id)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::conflict("Email already in use")
        } else {
            ApiError::from(e)
        }
    })?;

    Ok(ApiResponse::success(
        UserPublic::from(user),
        "Account details updated",
    ))
}

/// PATCH /api/v1/users/avatar - Replace the avatar image
pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> ApiResult<UserPublic> {
    let url = store_image_field(&state, multipart, "avatar").await?;
    let user: User =
        sqlx::query_as("UPDATE users SET avatar_url = $1, updated_at = now() WHERE id = $2 RETURNING *")
            .bind(&url)
            .bind(auth.id)
            .fetch_one(&state.pool)
            .await?;
    Ok(ApiResponse::success(UserPublic::from(user), "Avatar updated"))
}

/// PATCH /api/v1/users/coverImage - Replace the cover image
pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> ApiResult<UserPublic> {
    let url = store_image_field(&state, multipart, "coverImage").await?;
    let user: User = sqlx::query_as(
        "UPDATE users SET cover_image_url = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(&url)
    .bind(auth.id)
    .fetch_one(&state.pool)
    .await?;
    Ok(ApiResponse::success(UserPublic::from(user), "Cover image updated"))
}

/// GET /api/v1/users/channel-profile/:username
///
/// Public-safe channel view: subscriber count, subscribed-channel count and
/// whether the requester is currently subscribed, computed in one pipeline.
/// 404 when no user matches the username.
pub async fn channel_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(username): Path<String>,
) -> ApiResult<Value> {
    let profile = Pipeline::new("users")?
        .project(&[
            "id",
            "username",
            "fullname",
            "email",
            "avatar_url",
            "cover_image_url",
            "created_at",
        ])?
        .match_eq("username", username.as_str())?
        .count_of("subscriptions", "channel_id", "subscribers_count")?
        .count_of("subscriptions", "subscriber_id", "subscribed_to_count")?
        .exists_of("subscriptions", "channel_id", "subscriber_id", auth.id, "is_subscribed")?
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;

    Ok(ApiResponse::success(profile, "Channel profile fetched"))
}

/// GET /api/v1/users/watch-history
///
/// The requester's history, most recent first, each entry joined with the
/// video and the video's owner summary.
pub async fn watch_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<Value>> {
    let page = Pipeline::new("watch_history")?
        .match_id("user_id", auth.id)?
        .sort("watched_at", SortDirection::Desc)?
        .lookup(
            Lookup::new("videos", "video_id", "id", "video")
                .project(&[
                    "id",
                    "title",
                    "thumbnail_url",
                    "video_url",
                    "description",
                    "duration",
                    "views",
                    "created_at",
                ])
                .nested(
                    Lookup::new("users", "owner_id", "id", "owner")
                        .project(&["id", "username", "fullname", "avatar_url"]),
                ),
        )?
        .paginate(PageParams::from_query(query.page, query.limit))
        .fetch_page(&state.pool)
        .await?;

    Ok(ApiResponse::success(page, "Watch history fetched"))
}

async fn issue_token_pair(state: &AppState, user_id: Uuid) -> Result<(String, String), ApiError> {
    let access = state.tokens.issue_access_token(user_id)?;
    let refresh = state.tokens.issue_refresh_token(user_id)?;

    // Single active refresh token: the overwrite retires any predecessor
    sqlx::query("UPDATE users SET refresh_token = $1, updated_at = now() WHERE id = $2")
        .bind(&refresh)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    Ok((access, refresh))
}

/// A presented refresh token is live only while it equals the single token
/// stored on the user row. Rotation overwrites that value and logout clears
/// it, so either retires every previously issued token.
fn refresh_token_is_current(stored: Option<&str>, presented: &str) -> bool {
    stored == Some(presented)
}

fn with_auth_cookies(jar: CookieJar, access: &str, refresh: &str) -> CookieJar {
    jar.add(auth_cookie(ACCESS_TOKEN_COOKIE, access.to_string()))
        .add(auth_cookie(REFRESH_TOKEN_COOKIE, refresh.to_string()))
}

fn without_auth_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(auth_cookie(ACCESS_TOKEN_COOKIE, String::new()))
        .remove(auth_cookie(REFRESH_TOKEN_COOKIE, String::new()))
}

fn auth_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build()
}

/// Stage and store a single image field, returning the remote URL.
async fn store_image_field(
    state: &AppState,
    multipart: Multipart,
    field: &str,
) -> Result<String, ApiError> {
    let (_, mut files) = read_multipart(multipart).await?;
    let file = files
        .remove(field)
        .ok_or_else(|| ApiError::bad_request(format!("{} file is required", field)))?;
    let staged = state.media.stage(file.filename.as_deref(), &file.bytes).await?;
    let stored = state
        .media
        .store(&staged)
        .await
        .ok_or_else(|| ApiError::bad_request(format!("{} could not be stored", field)))?;
    Ok(stored.url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presented_token_must_equal_the_stored_one() {
        assert!(refresh_token_is_current(Some("refresh-a"), "refresh-a"));
        assert!(!refresh_token_is_current(Some("refresh-b"), "refresh-a"));
    }

    #[test]
    fn rotation_retires_the_previous_token() {
        // After a successful refresh the row holds the newly issued token
        let stored_after_rotation = Some("refresh-2");
        assert!(!refresh_token_is_current(stored_after_rotation, "refresh-1"));
        assert!(refresh_token_is_current(stored_after_rotation, "refresh-2"));
    }

    #[test]
    fn cleared_token_matches_nothing() {
        // Logout stores NULL; a second logout stores NULL again, so the
        // comparison stays false no matter how often it runs
        assert!(!refresh_token_is_current(None, "refresh-1"));
        assert!(!refresh_token_is_current(None, ""));
    }

    #[test]
    fn clearing_cookies_is_idempotent() {
        let jar = with_auth_cookies(CookieJar::new(), "access", "refresh");
        assert!(jar.get(ACCESS_TOKEN_COOKIE).is_some());

        let jar = without_auth_cookies(jar);
        let jar = without_auth_cookies(jar);
        assert!(jar.get(ACCESS_TOKEN_COOKIE).is_none());
        assert!(jar.get(REFRESH_TOKEN_COOKIE).is_none());
    }

    #[test]
    fn auth_cookies_are_http_only_and_secure() {
        let cookie = auth_cookie(ACCESS_TOKEN_COOKIE, "token".to_string());
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path().map(|p| p.to_string()), Some("/".to_string()));
    }
}
