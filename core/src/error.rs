use thiserror::Error;

pub type PlanResult<T> = Result<T, PlanError>;

#[derive(Error, Debug)]
pub enum PlanError {
    /// Rejected before any store access; `field` names the offending input.
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Recipe {0} not found")]
    InvalidReference(i64),

    #[error("Failed to render {format} export: {message}")]
    Export {
        format: &'static str,
        message: String,
    },

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PlanError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn export(format: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Export {
            format,
            message: err.to_string(),
        }
    }
}
