use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutantError {
    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Stale reference: {0}")]
    StaleReference(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MutantError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_migration(&self) -> bool {
        matches!(self, Self::Migration(_))
    }
}

pub type Result<T> = std::result::Result<T, MutantError>;

impl<T> From<std::sync::PoisonError<T>> for MutantError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for MutantError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
