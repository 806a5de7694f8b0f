use shared::{
    domain::EntityId,
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("entity {0} not found")]
    NotFound(EntityId),
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error("entity service failure: {0}")]
    Service(String),
    #[error("{0}")]
    Conflict(String),
}

impl EntityError {
    pub fn service(message: impl Into<String>) -> Self {
        EntityError::Service(message.into())
    }

    /// Text for the single notification shown when an operation fails.
    pub fn user_message(&self) -> String {
        match self {
            EntityError::NotFound(id) => format!("Entity {id} could not be found"),
            EntityError::Validation { message, .. } => message.clone(),
            EntityError::Service(_) => "Entity service request failed, please try again".to_string(),
            EntityError::Conflict(message) => message.clone(),
        }
    }

    /// Maps a wire error. `id` is the entity the failed call was about, if any.
    pub fn from_api(err: ApiError, id: Option<EntityId>) -> Self {
        match (err.code, id) {
            (ErrorCode::NotFound, Some(id)) => EntityError::NotFound(id),
            (ErrorCode::Validation, _) => EntityError::Validation {
                field: err.field.unwrap_or_else(|| "name".to_string()),
                message: err.message,
            },
            (ErrorCode::Conflict, _) => EntityError::Conflict(err.message),
            _ => EntityError::Service(err.message),
        }
    }
}

impl From<reqwest::Error> for EntityError {
    fn from(value: reqwest::Error) -> Self {
        EntityError::Service(value.to_string())
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
