use crate::{SessionError, fields};
use docket_graph::{
    CheckpointRepository, CheckpointStatus, CompiledGraph, ConversationState, Engine, EngineConfig,
    Message, RunOutcome,
};
use docket_store::{ConversationId, SharedCheckpointStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// What a caller sees of a conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub is_ended: bool,
    pub is_successful: bool,
}

type ConversationLock = Arc<tokio::sync::Mutex<()>>;

pub struct ConversationService {
    engine: Engine,
    repository: CheckpointRepository,
    locks: Mutex<BTreeMap<ConversationId, ConversationLock>>,
}

impl ConversationService {
    pub fn new(
        graph: Arc<CompiledGraph>,
        store: SharedCheckpointStore,
        config: EngineConfig,
    ) -> Self {
        Self {
            engine: Engine::new(graph, config),
            repository: CheckpointRepository::new(store),
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Full visible history plus status, without running any step.
    pub async fn get_state(&self, conversation_id: &ConversationId) -> Result<ChatState, SessionError> {
        let checkpoint = self
            .repository
            .load(conversation_id)
            .await?
            .ok_or_else(|| SessionError::NotFound {
                conversation_id: conversation_id.clone(),
            })?;
        let effective = checkpoint.effective_state()?;
        Ok(ChatState {
            messages: effective.messages()?,
            is_ended: checkpoint.is_ended(),
            is_successful: effective.flag(fields::SUCCESS),
        })
    }

    /// Starts the conversation with `text` or resumes it with `text` as the
    /// answer to the pending interrupt. Returns only the messages produced by
    /// this call.
    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn process_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<ChatState, SessionError> {
        let lock = self.conversation_lock(conversation_id)?;
        let _guard = lock.lock().await;

        let checkpoint = self.repository.load(conversation_id).await?;
        let (outcome, seen, expected_version) = match checkpoint {
            None => {
                tracing::info!("starting new conversation");
                let initial = ConversationState::new()
                    .with(fields::CONVERSATION_ID, conversation_id.as_str())
                    .with(fields::FIRST_INPUT, text);
                (self.engine.start(initial).await?, 0, None)
            }
            Some(checkpoint) if checkpoint.is_ended() => {
                tracing::warn!("message rejected for concluded conversation");
                return Err(SessionError::ConversationEnded {
                    conversation_id: conversation_id.clone(),
                });
            }
            Some(checkpoint) => {
                let seen = checkpoint.effective_state()?.message_count();
                let position = checkpoint.position().cloned().ok_or_else(|| {
                    SessionError::Invariant("paused checkpoint without a position".to_string())
                })?;
                let outcome = self
                    .engine
                    .resume(checkpoint.state, position, Value::String(text.to_string()))
                    .await?;
                (outcome, seen, Some(checkpoint.version))
            }
        };

        let (state, status) = match outcome {
            RunOutcome::Suspended { state, position } => (state, CheckpointStatus::Paused(position)),
            RunOutcome::Finished { state } => (state, CheckpointStatus::Ended),
        };
        let saved = self
            .repository
            .save(conversation_id, &state, &status, expected_version)
            .await?;

        let effective = saved.effective_state()?;
        let mut history = effective.messages()?;
        if history.len() < seen {
            return Err(SessionError::Invariant(format!(
                "history shrank from {seen} to {} messages",
                history.len()
            )));
        }
        let messages = history.split_off(seen);
        tracing::info!(
            new_messages = messages.len(),
            ended = saved.is_ended(),
            version = saved.version,
            "message processed"
        );

        Ok(ChatState {
            messages,
            is_ended: saved.is_ended(),
            is_successful: effective.flag(fields::SUCCESS),
        })
    }

    pub async fn is_ended(&self, conversation_id: &ConversationId) -> Result<bool, SessionError> {
        self.repository
            .load(conversation_id)
            .await?
            .map(|checkpoint| checkpoint.is_ended())
            .ok_or_else(|| SessionError::NotFound {
                conversation_id: conversation_id.clone(),
            })
    }

    fn conversation_lock(&self, conversation_id: &ConversationId) -> Result<ConversationLock, SessionError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| SessionError::Invariant("conversation lock table poisoned".to_string()))?;
        locks.retain(|id, lock| id == conversation_id || Arc::strong_count(lock) > 1);
        Ok(Arc::clone(locks.entry(conversation_id.clone()).or_default()))
    }
}
