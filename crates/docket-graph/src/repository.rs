use crate::{Checkpoint, CheckpointError, CheckpointStatus, ConversationState};
use docket_store::{ConversationId, SaveCheckpointRequest, SharedCheckpointStore};

/// Typed checkpoints on top of a raw [`docket_store::CheckpointStore`].
#[derive(Clone)]
pub struct CheckpointRepository {
    store: SharedCheckpointStore,
}

impl CheckpointRepository {
    pub fn new(store: SharedCheckpointStore) -> Self {
        Self { store }
    }

    pub async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        match self.store.load(conversation_id).await? {
            Some(stored) => Checkpoint::from_stored(stored).map(Some),
            None => Ok(None),
        }
    }

    /// Replaces the checkpoint. `expected_version` is the version the caller
    /// loaded, or `None` for a conversation that has no checkpoint yet.
    pub async fn save(
        &self,
        conversation_id: &ConversationId,
        state: &ConversationState,
        status: &CheckpointStatus,
        expected_version: Option<u64>,
    ) -> Result<Checkpoint, CheckpointError> {
        let payload = Checkpoint::encode(state, status)?;
        let stored = self
            .store
            .save(SaveCheckpointRequest {
                conversation_id: conversation_id.clone(),
                expected_version,
                payload,
            })
            .await?;
        tracing::debug!(
            conversation_id = %stored.conversation_id,
            version = stored.version,
            content_hash = %stored.content_hash,
            "checkpoint saved"
        );
        Checkpoint::from_stored(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecutionPosition, Frame, Interrupt, Message, StateUpdate};
    use docket_store::{MemoryCheckpointStore, StoreError};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(flavor = "current_thread")]
    async fn save_then_load_expected_exact_position() {
        let repository = CheckpointRepository::new(Arc::new(MemoryCheckpointStore::new()));
        let id = "42".to_string();
        let state = crate::StateSchema::default()
            .merge(
                &ConversationState::new().with("first_input", "hi"),
                &StateUpdate::new().push_message(Message::user("hi")),
            )
            .expect("merge should succeed");
        let status = CheckpointStatus::Paused(ExecutionPosition {
            frames: vec![
                Frame {
                    graph: "root".to_string(),
                    step: "sub".to_string(),
                    state: None,
                },
                Frame {
                    graph: "inner".to_string(),
                    step: "ask".to_string(),
                    state: Some(state.clone().with("inner_flag", true)),
                },
            ],
            interrupt: Interrupt {
                prompt: Some(json!({"question": "continue?"})),
                index: 1,
            },
            resume_values: vec![json!("yes")],
        });

        let saved = repository
            .save(&id, &state, &status, None)
            .await
            .expect("save should succeed");
        let loaded = repository
            .load(&id)
            .await
            .expect("load should succeed")
            .expect("checkpoint should exist");

        assert_eq!(loaded, saved);
        assert_eq!(loaded.status, status);
        assert_eq!(loaded.state, state);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn save_with_stale_version_expected_store_conflict() {
        let repository = CheckpointRepository::new(Arc::new(MemoryCheckpointStore::new()));
        let id = "42".to_string();
        let state = ConversationState::new();
        repository
            .save(&id, &state, &CheckpointStatus::Ended, None)
            .await
            .expect("first save should succeed");

        let error = repository
            .save(&id, &state, &CheckpointStatus::Ended, None)
            .await
            .expect_err("second create should conflict");
        assert!(matches!(
            error,
            CheckpointError::Store(StoreError::Conflict(_))
        ));
    }
}
