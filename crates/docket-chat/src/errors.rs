use docket_graph::{CheckpointError, EngineError, StateError};
use docket_store::ConversationId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("conversation '{conversation_id}' does not exist")]
    NotFound { conversation_id: ConversationId },
    #[error("conversation '{conversation_id}' has already concluded")]
    ConversationEnded { conversation_id: ConversationId },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("session invariant violated: {0}")]
    Invariant(String),
}

impl SessionError {
    /// Errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ConversationEnded { .. })
    }
}
