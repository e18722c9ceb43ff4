use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Task not found: {0}")]
    TaskNotFound(u64),

    #[error("Conversation {conversation} not found in task {task}")]
    ConversationNotFound { task: u64, conversation: u64 },

    #[error("Controller runtime has shut down")]
    RuntimeClosed,

    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A middleware step returned an error instead of continuing.
#[derive(Debug, Error)]
#[error("{chain} middleware step {step} failed: {source}")]
pub struct MiddlewareError {
    pub chain: &'static str,
    pub step: usize,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object has no string `id` field")]
    MissingId,

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Storage backend error: {0}")]
    Backend(anyhow::Error),
}
