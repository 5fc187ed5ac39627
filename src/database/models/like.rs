use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A like references either a video or a comment, never both; the store
/// enforces the exclusivity with a CHECK constraint.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Like {
    pub id: Uuid,
    pub video_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub liked_by: Uuid,
    pub created_at: DateTime<Utc>,
}
