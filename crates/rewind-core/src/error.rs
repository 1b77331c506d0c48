use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewindError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("No active model configured")]
    NoActiveModel,

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RewindError {
    /// Short error code string included in command responses.
    pub fn code(&self) -> &'static str {
        match self {
            RewindError::Config(_) => "CONFIG_ERROR",
            RewindError::Database(_) => "DATABASE_ERROR",
            RewindError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            RewindError::NoActiveModel => "NO_ACTIVE_MODEL",
            RewindError::Image(_) => "IMAGE_ERROR",
            RewindError::Validation(_) => "VALIDATION_ERROR",
            RewindError::NotFound { .. } => "NOT_FOUND",
            RewindError::Serialization(_) => "SERIALIZATION_ERROR",
            RewindError::Io(_) => "IO_ERROR",
            RewindError::Cancelled => "CANCELLED",
            RewindError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RewindError>;
