use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::media::MediaClient;

/// Shared application state: built once in `main`, cloned into every
/// handler. Components receive configuration through here rather than
/// reading the environment.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub media: Arc<MediaClient>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let tokens = TokenService::new(&config.auth);
        let media = Arc::new(MediaClient::new(&config.media));
        Self {
            pool,
            config: Arc::new(config),
            tokens,
            media,
        }
    }
}
