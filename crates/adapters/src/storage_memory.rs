//! In-memory object store for dry runs and tests

use async_trait::async_trait;
use recipe_writer_domain::{ObjectStore, StorageError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Records uploads instead of transferring them
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, PathBuf>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Local file recorded for `key`
    pub fn source_of(&self, key: &str) -> Option<PathBuf> {
        self.objects
            .read()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StorageError> {
        if !local_path.is_file() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No such file: {}", local_path.display()),
            )));
        }

        let mut objects = self.objects.write().map_err(|e| StorageError::Upload {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        objects.insert(key.to_string(), local_path.to_path_buf());

        tracing::info!(key = %key, "[DRY RUN] Would upload");
        Ok(())
    }

    fn location(&self) -> String {
        "memory://".to_string()
    }
}
