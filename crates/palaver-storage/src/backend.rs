//! Where topic records live between runs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use palaver_core::error::{PalaverError, Result};

use crate::migrations::decode_record;
use crate::record::TopicRecord;

/// Persistence collaborator for one user's topic store.
pub trait TopicBackend: Send {
    /// Read the stored record, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<TopicRecord>>;

    /// Replace the stored record. Must be durable when it returns `Ok`.
    fn save(&self, record: &TopicRecord) -> Result<()>;
}

/// One pretty-printed JSON file per user, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `{data_dir}/history/history_{user_id}.json`
    pub fn for_user(data_dir: &Path, user_id: &str) -> Self {
        Self::new(
            data_dir
                .join("history")
                .join(format!("history_{user_id}.json")),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TopicBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<TopicRecord>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No topic record on disk");
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        decode_record(&content).map(Some)
    }

    fn save(&self, record: &TopicRecord) -> Result<()> {
        write_json_atomic(&self.path, record)?;
        debug!(
            path = %self.path.display(),
            topics = record.topics.len(),
            "Topic record saved"
        );
        Ok(())
    }
}

/// Serialize `value` next to `path` and rename it into place, so readers
/// see either the old file or the new one.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| PalaverError::Storage(format!("{} has no parent directory", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let content = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        PalaverError::Storage(format!("failed to replace {}: {e}", path.display()))
    })
}

/// Shared in-memory slot. Clones see the same record, which lets a test keep
/// a handle after giving the backend to a store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    record: Arc<Mutex<Option<TopicRecord>>>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: TopicRecord) -> Self {
        let backend = Self::default();
        if let Ok(mut slot) = backend.record.lock() {
            *slot = Some(record);
        }
        backend
    }

    /// Last saved record.
    pub fn snapshot(&self) -> Option<TopicRecord> {
        self.record.lock().ok().and_then(|slot| slot.clone())
    }

    /// Make every following `save` fail with a storage error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl TopicBackend for MemoryBackend {
    fn load(&self) -> Result<Option<TopicRecord>> {
        let slot = self
            .record
            .lock()
            .map_err(|e| PalaverError::Storage(format!("memory backend poisoned: {e}")))?;
        Ok(slot.clone())
    }

    fn save(&self, record: &TopicRecord) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PalaverError::Storage("memory backend rejected save".to_string()));
        }
        let mut slot = self
            .record
            .lock()
            .map_err(|e| PalaverError::Storage(format!("memory backend poisoned: {e}")))?;
        *slot = Some(record.clone());
        Ok(())
    }
}
