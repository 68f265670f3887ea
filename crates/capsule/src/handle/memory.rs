//! In-memory capability tree.
//!
//! Handles share their state through `Arc`, so a clone kept by a test sees
//! every write made through the tree it was inserted into.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DirectoryHandle, FileHandle, Handle, HandleError, HandleId, WritableStream};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> HandleId {
    HandleId::new(format!("mem:{}", NEXT_ID.fetch_add(1, Ordering::Relaxed)))
}

#[derive(Debug, Default)]
struct FileState {
    data: RwLock<Vec<u8>>,
    locked: AtomicBool,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

/// A file held in memory.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    id: HandleId,
    state: Arc<FileState>,
}

impl MemoryFile {
    /// Create a file with the given contents.
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            id: next_id(),
            state: Arc::new(FileState {
                data: RwLock::new(contents.into()),
                ..FileState::default()
            }),
        }
    }

    /// Current committed contents.
    pub async fn contents(&self) -> Vec<u8> {
        self.state.data.read().await.clone()
    }

    /// Number of successful host reads served so far.
    pub fn read_count(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    /// Make subsequent reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent commits fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> HandleId {
        self.id.clone()
    }

    async fn read_bytes(&self) -> Result<Vec<u8>, HandleError> {
        if self.state.fail_reads.load(Ordering::SeqCst) {
            return Err(HandleError::Host(format!("read failed: {}", self.name)));
        }
        let data = self.state.data.read().await.clone();
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    async fn open_for_exclusive_write(&self) -> Result<Box<dyn WritableStream>, HandleError> {
        if self.state.locked.swap(true, Ordering::SeqCst) {
            return Err(HandleError::PermissionDenied(format!(
                "{} is already open for writing",
                self.name
            )));
        }
        Ok(Box::new(MemoryWriter {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            closed: false,
        }))
    }
}

struct MemoryWriter {
    state: Arc<FileState>,
    pending: Vec<u8>,
    closed: bool,
}

#[async_trait]
impl WritableStream for MemoryWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), HandleError> {
        if self.closed {
            return Err(HandleError::Closed);
        }
        self.pending.extend_from_slice(data);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), HandleError> {
        if self.closed {
            return Err(HandleError::Closed);
        }
        self.closed = true;
        self.state.locked.store(false, Ordering::SeqCst);
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(HandleError::Host("commit failed".to_string()));
        }
        *self.state.data.write().await = std::mem::take(&mut self.pending);
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if !self.closed {
            self.state.locked.store(false, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Default)]
struct DirState {
    entries: RwLock<Vec<(String, Handle)>>,
    failing: AtomicBool,
}

/// A directory held in memory. Entries enumerate in insertion order.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    name: String,
    id: HandleId,
    state: Arc<DirState>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: next_id(),
            state: Arc::new(DirState::default()),
        }
    }

    /// Create a directory whose enumeration always fails.
    pub fn failing(name: impl Into<String>) -> Self {
        let dir = Self::new(name);
        dir.state.failing.store(true, Ordering::SeqCst);
        dir
    }

    /// Add a file entry.
    pub fn with_file(self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        self.with_handle(Handle::file(MemoryFile::new(name, contents)))
    }

    /// Add a subdirectory entry.
    pub fn with_directory(self, dir: MemoryDirectory) -> Self {
        self.with_handle(Handle::directory(dir))
    }

    /// Add an arbitrary handle under its own name.
    pub fn with_handle(self, handle: Handle) -> Self {
        let name = handle.name().to_string();
        // Builders never contend for the lock.
        if let Ok(mut entries) = self.state.entries.try_write() {
            entries.push((name, handle));
        }
        self
    }

    /// Insert an entry after construction, replacing any entry with the same name.
    pub async fn insert(&self, handle: Handle) {
        let name = handle.name().to_string();
        let mut entries = self.state.entries.write().await;
        entries.retain(|(existing, _)| *existing != name);
        entries.push((name, handle));
    }

    /// Remove an entry by name. Returns whether it existed.
    pub async fn remove(&self, name: &str) -> bool {
        let mut entries = self.state.entries.write().await;
        let before = entries.len();
        entries.retain(|(existing, _)| existing != name);
        entries.len() != before
    }

    /// Toggle enumeration failures.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> HandleId {
        self.id.clone()
    }

    async fn list_entries(&self) -> Result<Vec<(String, Handle)>, HandleError> {
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(HandleError::Host(format!(
                "cannot enumerate {}",
                self.name
            )));
        }
        Ok(self.state.entries.read().await.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_keep_insertion_order() {
        let dir = MemoryDirectory::new("root")
            .with_file("b.txt", "b")
            .with_directory(MemoryDirectory::new("a"))
            .with_file("c.txt", "c");

        let names: Vec<String> = dir
            .list_entries()
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["b.txt", "a", "c.txt"]);
    }

    #[tokio::test]
    async fn test_write_is_invisible_until_close() {
        let file = MemoryFile::new("notes.md", "old");
        let mut stream = file.open_for_exclusive_write().await.unwrap();
        stream.write(b"new").await.unwrap();
        assert_eq!(file.contents().await, b"old");

        stream.close().await.unwrap();
        assert_eq!(file.contents().await, b"new");
    }

    #[tokio::test]
    async fn test_exclusive_write_lock() {
        let file = MemoryFile::new("lock.txt", "");
        let first = file.open_for_exclusive_write().await.unwrap();
        assert!(matches!(
            file.open_for_exclusive_write().await,
            Err(HandleError::PermissionDenied(_))
        ));

        drop(first);
        assert!(file.open_for_exclusive_write().await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_directory() {
        let dir = MemoryDirectory::failing("broken");
        assert!(dir.list_entries().await.is_err());
        dir.set_failing(false);
        assert!(dir.list_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_replaces_same_name() {
        let dir = MemoryDirectory::new("root").with_file("a.txt", "1");
        dir.insert(Handle::file(MemoryFile::new("a.txt", "2"))).await;

        let entries = dir.list_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        let file = entries[0].1.as_file().unwrap();
        assert_eq!(file.read_bytes().await.unwrap(), b"2");
    }
}
