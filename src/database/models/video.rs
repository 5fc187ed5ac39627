use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::access::Owned;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Video {
    pub id: Uuid,
    pub video_url: String,
    pub thumbnail_url: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: Option<f64>,
    pub views: i64,
    pub is_published: bool,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Owned for Video {
    fn owner_id(&self) -> Uuid {
        self.owner_id
    }
}
