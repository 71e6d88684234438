use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ConversationId = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    pub conversation_id: ConversationId,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: Vec<u8>,
    pub content_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveCheckpointRequest {
    pub conversation_id: ConversationId,
    /// `None` requires that no checkpoint exists yet for the conversation.
    pub expected_version: Option<u64>,
    pub payload: Vec<u8>,
}

impl StoredCheckpoint {
    pub(crate) fn first(request: SaveCheckpointRequest, now: DateTime<Utc>) -> Self {
        Self {
            content_hash: content_hash(&request.payload),
            conversation_id: request.conversation_id,
            version: 1,
            created_at: now,
            updated_at: now,
            payload: request.payload,
        }
    }

    pub(crate) fn replaced_by(&self, request: SaveCheckpointRequest, now: DateTime<Utc>) -> Self {
        Self {
            content_hash: content_hash(&request.payload),
            conversation_id: request.conversation_id,
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: now,
            payload: request.payload,
        }
    }
}

pub fn content_hash(payload: &[u8]) -> String {
    blake3::hash(payload).to_hex().to_string()
}
