use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("unknown question kind: {0}")]
    UnknownQuestionKind(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
