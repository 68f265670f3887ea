//! File contents cache and editable-file records.
//!
//! The cache is the single record of "current content" per file handle. Reads
//! fill it, writes refresh it only after the host confirmed the write, and a
//! full reset empties it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::handle::{FileHandle, HandleError, HandleId, HandleKind};
use crate::tree::TreeNode;

/// Last-known text content per file handle.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: HashMap<HandleId, String>,
}

impl ContentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of `file`, from the cache when possible.
    ///
    /// Host read failures are logged and degrade to empty content; nothing is
    /// cached in that case.
    pub async fn read(&mut self, file: &dyn FileHandle) -> String {
        let id = file.id();
        if let Some(content) = self.entries.get(&id) {
            return content.clone();
        }

        match file.read_bytes().await {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes).into_owned();
                self.entries.insert(id, content.clone());
                content
            }
            Err(e) => {
                tracing::error!(file = file.name(), "failed to read file: {}", e);
                String::new()
            }
        }
    }

    /// Replace the contents of `file` with `text`.
    ///
    /// The cache entry is updated only after the stream closed successfully.
    /// Returns `false` on any host failure.
    pub async fn write(&mut self, file: &dyn FileHandle, text: &str) -> bool {
        match write_through(file, text).await {
            Ok(()) => {
                self.entries.insert(file.id(), text.to_string());
                tracing::info!(file = file.name(), bytes = text.len(), "file saved");
                true
            }
            Err(e) => {
                tracing::error!(file = file.name(), "failed to save file: {}", e);
                false
            }
        }
    }

    /// Overwrite an entry without touching the host.
    pub fn update(&mut self, id: HandleId, text: impl Into<String>) {
        self.entries.insert(id, text.into());
    }

    /// Cached content, if any.
    pub fn get(&self, id: &HandleId) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    /// Drop a single entry so the next read goes to the host.
    pub fn invalidate(&mut self, id: &HandleId) {
        self.entries.remove(id);
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn write_through(file: &dyn FileHandle, text: &str) -> Result<(), HandleError> {
    let mut stream = file.open_for_exclusive_write().await?;
    stream.write(text.as_bytes()).await?;
    stream.close().await
}

/// A file opened for editing.
#[derive(Debug, Clone, Serialize)]
pub struct EditableFile {
    /// Browsing node id
    pub id: String,
    /// Entry name
    pub name: String,
    /// Browsing node path
    pub path: String,
    /// Always [`HandleKind::File`]
    pub kind: HandleKind,
    /// Current content
    pub content: String,
    /// Whether `content` differs from what was last read or saved
    pub modified: bool,
    /// Capability used for saving
    #[serde(skip)]
    pub handle: Arc<dyn FileHandle>,
}

/// Open a browsing node for editing, reading through the cache.
///
/// Returns `None` for directory nodes.
pub async fn open(cache: &mut ContentCache, node: &TreeNode) -> Option<EditableFile> {
    let handle = Arc::clone(node.handle.as_file()?);
    let content = cache.read(handle.as_ref()).await;
    Some(EditableFile {
        id: node.id.clone(),
        name: node.name.clone(),
        path: node.path.clone(),
        kind: node.kind,
        content,
        modified: false,
        handle,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::handle::memory::MemoryFile;

    #[tokio::test]
    async fn test_read_hits_cache() {
        let file = MemoryFile::new("a.txt", "hello");
        let mut cache = ContentCache::new();

        assert_eq!(cache.read(&file).await, "hello");
        assert_eq!(cache.read(&file).await, "hello");
        assert_eq!(file.read_count(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_empty() {
        let file = MemoryFile::new("a.txt", "hello");
        file.set_fail_reads(true);
        let mut cache = ContentCache::new();

        assert_eq!(cache.read(&file).await, "");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_read_invalid_utf8_is_lossy() {
        let file = MemoryFile::new("bin", vec![b'o', b'k', 0xff]);
        let mut cache = ContentCache::new();
        assert_eq!(cache.read(&file).await, "ok\u{fffd}");
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let file = MemoryFile::new("a.txt", "old");
        let mut cache = ContentCache::new();
        assert!(cache.write(&file, "new text\nline 2").await);
        assert_eq!(cache.get(&file.id()), Some("new text\nline 2"));

        cache.clear();
        assert_eq!(cache.read(&file).await, "new text\nline 2");
        assert_eq!(file.read_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let file = MemoryFile::new("a.txt", "old");
        let mut cache = ContentCache::new();
        cache.read(&file).await;

        file.set_fail_writes(true);
        assert!(!cache.write(&file, "new").await);
        assert_eq!(cache.get(&file.id()), Some("old"));
        assert_eq!(file.contents().await, b"old");
    }

    #[tokio::test]
    async fn test_write_fails_while_locked() {
        let file = MemoryFile::new("a.txt", "old");
        let _held = file.open_for_exclusive_write().await.unwrap();
        let mut cache = ContentCache::new();
        assert!(!cache.write(&file, "new").await);
        assert!(cache.get(&file.id()).is_none());
    }
}
