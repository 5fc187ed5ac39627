use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Lookup '{0}' must project at least one column")]
    EmptyLookupProjection(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
