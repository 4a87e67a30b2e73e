//! Chat sync error types.

use thiserror::Error;

/// Result type for chat sync operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors that can occur in chat sync operations.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("send rejected: {0}")]
    Rejected(String),

    #[error("{peer} is not listening right now")]
    PeerNotListening { peer: String },

    #[error("no conversation selected")]
    NoConversation,

    #[error("folders cannot be sent to the broadcast conversation")]
    BroadcastFolderUnsupported,

    #[error("folder contains no files: {0}")]
    EmptyFolder(String),

    #[error("upload not found: {0}")]
    UploadNotFound(String),

    #[error("name store error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("chat sync engine not running")]
    EngineStopped,
}

impl ChatError {
    /// True for precondition failures caught before any request was issued.
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            ChatError::PeerNotListening { .. }
                | ChatError::NoConversation
                | ChatError::BroadcastFolderUnsupported
                | ChatError::EmptyFolder(_)
        )
    }
}
