use crate::{CheckpointError, ConversationState, Interrupt};
use chrono::{DateTime, Utc};
use docket_store::{ConversationId, StoredCheckpoint};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// One nesting level of a paused run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub graph: String,
    pub step: String,
    /// Local state of a sub-graph level. The outermost frame leaves this empty
    /// because the checkpoint carries the root state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConversationState>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPosition {
    /// Outermost first.
    pub frames: Vec<Frame>,
    pub interrupt: Interrupt,
    /// Values already fed to earlier interrupts of the suspended step.
    #[serde(default)]
    pub resume_values: Vec<Value>,
}

impl ExecutionPosition {
    pub fn innermost(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointStatus {
    Paused(ExecutionPosition),
    Ended,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct CheckpointEnvelope {
    schema_version: u32,
    state: ConversationState,
    status: CheckpointStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub conversation_id: ConversationId,
    pub state: ConversationState,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Checkpoint {
    pub fn is_ended(&self) -> bool {
        matches!(self.status, CheckpointStatus::Ended)
    }

    pub fn position(&self) -> Option<&ExecutionPosition> {
        match &self.status {
            CheckpointStatus::Paused(position) => Some(position),
            CheckpointStatus::Ended => None,
        }
    }

    /// Freshest view of the conversation.
    ///
    /// While paused inside sub-graphs, each nested frame's state replaces the
    /// view of its parent when its history extends the parent's history. A
    /// nested history that does not start with the parent's is corrupt.
    pub fn effective_state(&self) -> Result<ConversationState, CheckpointError> {
        let Some(position) = self.position() else {
            return Ok(self.state.clone());
        };

        let mut effective = &self.state;
        for frame in &position.frames {
            let Some(local) = frame.state.as_ref() else {
                continue;
            };
            let outer = effective.messages()?;
            let inner = local.messages()?;
            if inner.len() < outer.len() || inner[..outer.len()] != outer[..] {
                return Err(CheckpointError::Invariant(format!(
                    "history of frame '{}/{}' does not extend its parent",
                    frame.graph, frame.step
                )));
            }
            effective = local;
        }
        Ok(effective.clone())
    }

    pub(crate) fn encode(
        state: &ConversationState,
        status: &CheckpointStatus,
    ) -> Result<Vec<u8>, CheckpointError> {
        let envelope = CheckpointEnvelope {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            state: state.clone(),
            status: status.clone(),
        };
        serde_json::to_vec(&envelope).map_err(|err| CheckpointError::Encode(err.to_string()))
    }

    pub fn from_stored(stored: StoredCheckpoint) -> Result<Self, CheckpointError> {
        let envelope: CheckpointEnvelope =
            serde_json::from_slice(&stored.payload).map_err(|err| CheckpointError::Decode {
                conversation_id: stored.conversation_id.clone(),
                message: err.to_string(),
            })?;
        if envelope.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(CheckpointError::UnsupportedSchema {
                found: envelope.schema_version,
            });
        }
        if let CheckpointStatus::Paused(position) = &envelope.status {
            if position.frames.is_empty() {
                return Err(CheckpointError::Invariant(format!(
                    "paused checkpoint for '{}' has no frames",
                    stored.conversation_id
                )));
            }
            if position.resume_values.len() != position.interrupt.index {
                return Err(CheckpointError::Invariant(format!(
                    "paused checkpoint for '{}' replays {} value(s) before interrupt {}",
                    stored.conversation_id,
                    position.resume_values.len(),
                    position.interrupt.index
                )));
            }
        }

        Ok(Self {
            conversation_id: stored.conversation_id,
            state: envelope.state,
            status: envelope.status,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            version: stored.version,
        })
    }
}
