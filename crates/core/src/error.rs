use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid uid: {0}")]
    InvalidUid(String),

    #[error("invalid entity key: {0}")]
    InvalidKey(String),

    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    #[error("system clock before epoch")]
    ClockBeforeEpoch,
}
