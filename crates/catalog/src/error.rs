use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    #[error("core error: {0}")]
    Core(#[from] tsmeta_core::CoreError),
}
