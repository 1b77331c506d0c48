use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store error: {0}")]
    Store(#[from] rewind_store::StoreError),

    #[error("LLM error: {0}")]
    Llm(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
