use std::collections::HashMap;

use axum::extract::Multipart;

use crate::error::ApiError;

pub mod comments;
pub mod likes;
pub mod playlists;
pub mod users;
pub mod videos;

/// One file field pulled out of a multipart body.
pub(crate) struct UploadedFile {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Drain a multipart body into text fields and file fields. A field counts
/// as a file when the client sent a filename for it.
pub(crate) async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(HashMap<String, String>, HashMap<String, UploadedFile>), ApiError> {
    let mut texts = HashMap::new();
    let mut files = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(|n| n.to_string()) else {
            continue;
        };
        if field.file_name().is_some() {
            let filename = field.file_name().map(|f| f.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
            files.insert(name, UploadedFile { filename, bytes: bytes.to_vec() });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read field: {}", e)))?;
            texts.insert(name, value);
        }
    }

    Ok((texts, files))
}

/// Required, non-blank text field of a multipart body.
pub(crate) fn require_text<'a>(
    texts: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, ApiError> {
    match texts.get(name).map(|s| s.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ApiError::validation(
            "Missing required fields",
            vec![format!("{} is required", name)],
        )),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
