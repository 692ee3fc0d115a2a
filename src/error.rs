use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("failed to parse policy: {0}")]
    ParseError(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("missing slot: {0}")]
    MissingSlot(String),

    #[error("unknown slot: {0}")]
    UnknownSlot(String),

    #[error("invalid entity uid: {0}")]
    InvalidEntityUid(String),

    #[error("request validation error: {0}")]
    RequestValidationError(String),

    #[error("invalid schema: {0}")]
    SchemaError(String),

    #[error("poisoned lock error: {0}")]
    PoisonedLockError(String),
}

impl<T> From<std::sync::PoisonError<T>> for PolicyError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        PolicyError::PoisonedLockError(err.to_string())
    }
}
