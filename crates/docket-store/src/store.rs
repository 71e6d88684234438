use crate::types::{ConversationId, SaveCheckpointRequest, StoredCheckpoint};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource not found: {resource} ({id})")]
    NotFound { resource: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type SharedCheckpointStore = Arc<dyn CheckpointStore>;

#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest checkpoint for the conversation, `None` when it was never saved.
    async fn load(&self, conversation_id: &ConversationId)
    -> StoreResult<Option<StoredCheckpoint>>;

    /// Replaces the checkpoint for `request.conversation_id` if the stored
    /// version still matches `request.expected_version`.
    async fn save(&self, request: SaveCheckpointRequest) -> StoreResult<StoredCheckpoint>;

    /// Removes a checkpoint. Only retention tooling calls this.
    async fn delete(&self, conversation_id: &ConversationId) -> StoreResult<bool>;

    async fn list_conversations(&self) -> StoreResult<Vec<ConversationId>>;
}

pub(crate) fn validate_conversation_id(conversation_id: &str) -> StoreResult<()> {
    if conversation_id.is_empty() {
        return Err(StoreError::InvalidInput(
            "conversation id cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Compare-and-swap check shared by the backends.
pub(crate) fn check_expected_version(
    request: &SaveCheckpointRequest,
    current: Option<&StoredCheckpoint>,
) -> StoreResult<()> {
    match (request.expected_version, current) {
        (None, None) => Ok(()),
        (Some(expected), Some(current)) if current.version == expected => Ok(()),
        (None, Some(current)) => Err(StoreError::Conflict(format!(
            "conversation {} already has checkpoint version {}",
            request.conversation_id, current.version
        ))),
        (Some(expected), Some(current)) => Err(StoreError::Conflict(format!(
            "conversation {} expected version {} but found {}",
            request.conversation_id, expected, current.version
        ))),
        (Some(expected), None) => Err(StoreError::Conflict(format!(
            "conversation {} expected version {} but no checkpoint exists",
            request.conversation_id, expected
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_not_found_expected_metadata() {
        let error = StoreError::NotFound {
            resource: "checkpoint",
            id: "42".to_string(),
        };

        assert!(matches!(
            error,
            StoreError::NotFound {
                resource: "checkpoint",
                ..
            }
        ));
        assert_eq!(error.to_string(), "resource not found: checkpoint (42)");
    }

    #[test]
    fn check_expected_version_absent_record_with_expectation_expected_conflict() {
        let request = SaveCheckpointRequest {
            conversation_id: "7".to_string(),
            expected_version: Some(3),
            payload: Vec::new(),
        };

        let error = check_expected_version(&request, None).expect_err("should conflict");
        assert!(matches!(error, StoreError::Conflict(message) if message.contains("no checkpoint")));
    }
}
