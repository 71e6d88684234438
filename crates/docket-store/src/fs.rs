use crate::store::{
    CheckpointStore, StoreError, StoreResult, check_expected_version, validate_conversation_id,
};
use crate::types::{ConversationId, SaveCheckpointRequest, StoredCheckpoint, content_hash};
use chrono::Utc;
use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const CHECKPOINT_EXTENSION: &str = "checkpoint.json";
const LOCK_EXTENSION: &str = "lock";

/// One JSON file per conversation under `root`.
///
/// Files are named after the blake3 hash of the conversation id, so ids of any
/// length and content map to a fixed-size name; the id itself lives in the
/// record. Saves and deletes hold an exclusive OS lock on a per-conversation
/// lock file, which fences writers in other processes sharing the same root.
/// Writes go through a temp file and a rename, so readers never observe a
/// partial record.
#[derive(Clone, Debug)]
pub struct FsCheckpointStore {
    root: PathBuf,
}

impl FsCheckpointStore {
    pub fn new<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        fs::create_dir_all(root.as_ref()).map_err(|err| {
            StoreError::Backend(format!("create checkpoint store root failed: {err}"))
        })?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, conversation_id: &str, extension: &str) -> PathBuf {
        self.root.join(format!(
            "{}.{extension}",
            content_hash(conversation_id.as_bytes())
        ))
    }

    fn checkpoint_path(&self, conversation_id: &str) -> PathBuf {
        self.file_path(conversation_id, CHECKPOINT_EXTENSION)
    }

    /// Blocks until this handle owns the conversation's lock. Dropping the
    /// returned file releases it.
    fn lock_conversation(&self, conversation_id: &str) -> StoreResult<File> {
        let path = self.file_path(conversation_id, LOCK_EXTENSION);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                StoreError::Backend(format!(
                    "open lock file '{}' failed: {err}",
                    path.display()
                ))
            })?;
        FileExt::lock_exclusive(&file).map_err(|err| {
            StoreError::Backend(format!("lock '{}' failed: {err}", path.display()))
        })?;
        Ok(file)
    }

    fn read_record(path: &Path) -> StoreResult<Option<StoredCheckpoint>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Backend(format!(
                    "read checkpoint file '{}' failed: {err}",
                    path.display()
                )));
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| StoreError::Serialization(err.to_string()))
    }

    fn read_checkpoint(&self, conversation_id: &str) -> StoreResult<Option<StoredCheckpoint>> {
        let Some(record) = Self::read_record(&self.checkpoint_path(conversation_id))? else {
            return Ok(None);
        };
        if record.conversation_id != conversation_id {
            return Err(StoreError::Backend(format!(
                "checkpoint file for '{conversation_id}' holds conversation '{}'",
                record.conversation_id
            )));
        }
        Ok(Some(record))
    }

    fn write_checkpoint(&self, checkpoint: &StoredCheckpoint) -> StoreResult<()> {
        let path = self.checkpoint_path(&checkpoint.conversation_id);
        let raw = serde_json::to_vec_pretty(checkpoint)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .map_err(|err| StoreError::Backend(format!("write checkpoint file failed: {err}")))?;
        fs::rename(&tmp, &path)
            .map_err(|err| StoreError::Backend(format!("rename checkpoint file failed: {err}")))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> StoreResult<Option<StoredCheckpoint>> {
        validate_conversation_id(conversation_id)?;
        self.read_checkpoint(conversation_id)
    }

    async fn save(&self, request: SaveCheckpointRequest) -> StoreResult<StoredCheckpoint> {
        validate_conversation_id(&request.conversation_id)?;
        let _lock = self.lock_conversation(&request.conversation_id)?;

        let current = self.read_checkpoint(&request.conversation_id)?;
        check_expected_version(&request, current.as_ref())?;

        let now = Utc::now();
        let stored = match current {
            Some(current) => current.replaced_by(request, now),
            None => StoredCheckpoint::first(request, now),
        };
        self.write_checkpoint(&stored)?;
        tracing::trace!(
            conversation_id = %stored.conversation_id,
            version = stored.version,
            "checkpoint file written"
        );
        Ok(stored)
    }

    async fn delete(&self, conversation_id: &ConversationId) -> StoreResult<bool> {
        validate_conversation_id(conversation_id)?;
        let _lock = self.lock_conversation(conversation_id)?;
        match fs::remove_file(self.checkpoint_path(conversation_id)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::Backend(format!(
                "remove checkpoint file failed: {err}"
            ))),
        }
    }

    async fn list_conversations(&self) -> StoreResult<Vec<ConversationId>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|err| StoreError::Backend(format!("list checkpoint root failed: {err}")))?;
        let suffix = format!(".{CHECKPOINT_EXTENSION}");

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|err| StoreError::Backend(format!("read dir entry failed: {err}")))?;
            let is_record = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(suffix.as_str()));
            if !is_record {
                continue;
            }
            // Deleted between listing and reading.
            if let Some(record) = Self::read_record(&entry.path())? {
                ids.push(record.conversation_id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
