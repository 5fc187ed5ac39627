use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use tubecast_api::config::AppConfig;
use tubecast_api::middleware::auth::require_auth;
use tubecast_api::state::AppState;
use tubecast_api::{database, handlers};

// Multipart video uploads need more headroom than the 2 MB axum default.
const UPLOAD_BODY_LIMIT: usize = 100 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT secrets, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = database::connect(&config.database).await?;
    let port = config.server.port;
    let state = AppState::new(pool, config);

    let app = app(state);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("tubecast api listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(user_routes(state.clone()))
        .nest("/api/v1/videos", video_routes(state.clone()))
        .nest("/api/v1/comments", comment_routes(state.clone()))
        .nest("/api/v1/likes", like_routes(state.clone()))
        .nest("/api/v1/playlists", playlist_routes(state.clone()))
        .layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn user_routes(state: AppState) -> Router<AppState> {
    use handlers::users;

    let public = Router::new()
        .route("/api/v1/users/register", post(users::register))
        .route("/api/v1/users/login", post(users::login))
        .route("/api/v1/users/refresh-token", post(users::refresh));

    let protected = Router::new()
        .route("/api/v1/users/logout", post(users::logout))
        .route("/api/v1/users/change-password", post(users::change_password))
        .route("/api/v1/users/update-account", patch(users::update_account))
        .route("/api/v1/users/avatar", patch(users::update_avatar))
        .route("/api/v1/users/cover-image", patch(users::update_cover_image))
        .route("/api/v1/users/c/:username", get(users::channel_profile))
        .route("/api/v1/users/history", get(users::watch_history))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth));

    public
        .merge(protected)
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

fn video_routes(state: AppState) -> Router<AppState> {
    use handlers::videos;

    Router::new()
        .route("/", get(videos::list).post(videos::upload))
        .route(
            "/:videoId",
            get(videos::get).patch(videos::update).delete(videos::delete),
        )
        .route("/toggle/publish/:videoId", patch(videos::toggle_publish))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

fn comment_routes(state: AppState) -> Router<AppState> {
    use handlers::comments;

    Router::new()
        .route("/:videoId", get(comments::list).post(comments::create))
        .route(
            "/c/:commentId",
            patch(comments::update).delete(comments::delete),
        )
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}

fn like_routes(state: AppState) -> Router<AppState> {
    use handlers::likes;

    Router::new()
        .route("/toggle/v/:videoId", post(likes::toggle_video_like))
        .route("/toggle/c/:commentId", post(likes::toggle_comment_like))
        .route("/videos", get(likes::liked_videos))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}

fn playlist_routes(state: AppState) -> Router<AppState> {
    use handlers::playlists;

    Router::new()
        .route("/", post(playlists::create))
        .route("/user/:userId", get(playlists::list_by_user))
        .route(
            "/:playlistId",
            get(playlists::get)
                .patch(playlists::update)
                .delete(playlists::delete),
        )
        .route("/add/:playlistId/:videoId", patch(playlists::add_video))
        .route("/remove/:playlistId/:videoId", patch(playlists::remove_video))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    match state
        .config
        .cors
        .allowed_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        None => CorsLayer::permissive(),
    }
}

async fn root() -> axum::response::Json<Value> {
    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Tubecast API",
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::response::Json<Value> {
    let database = database::health_check(&state.pool).await.is_ok();
    axum::response::Json(json!({
        "success": database,
        "data": { "database": database },
    }))
}
