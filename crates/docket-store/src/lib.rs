//! Durable checkpoint records for docket conversations.
//!
//! A store keeps exactly one opaque record per conversation id and replaces it
//! on every save. Writers are fenced with an optimistic version check that each
//! backend evaluates under its own lock: a per-store mutex in memory, an
//! exclusive OS file lock on disk. Two writers holding the same expected
//! version therefore never both commit, even across processes.

pub mod fs;
pub mod memory;
pub mod store;
pub mod types;

pub use fs::FsCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use store::{CheckpointStore, SharedCheckpointStore, StoreError, StoreResult};
pub use types::{ConversationId, SaveCheckpointRequest, StoredCheckpoint, content_hash};
