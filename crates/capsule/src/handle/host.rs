//! Capability tree backed by a real host directory.
//!
//! Writes go to a swap file next to the target and replace it on close, so a
//! failed write never leaves a half-written file behind.

use std::fs::FileType;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{DirectoryHandle, FileHandle, Handle, HandleError, HandleId, WritableStream};

const SWAP_SUFFIX: &str = ".capsule-swap";

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// A directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct HostDirectory {
    name: String,
    path: PathBuf,
}

impl HostDirectory {
    /// Open a capability to an existing directory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HandleError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_dir() {
            return Err(HandleError::NotADirectory(path.display().to_string()));
        }
        Ok(Self {
            name: entry_name(&path),
            path,
        })
    }

    /// Path on the host.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DirectoryHandle for HostDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> HandleId {
        HandleId::new(self.path.to_string_lossy())
    }

    async fn list_entries(&self) -> Result<Vec<(String, Handle)>, HandleError> {
        let mut reader = tokio::fs::read_dir(&self.path).await?;
        let mut entries = Vec::new();
        loop {
            let entry = match reader.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(directory = %self.path.display(), "directory listing cut short: {}", e);
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await;
            if let Some(handle) = entry_handle(&name, entry.path(), file_type) {
                entries.push((name, handle));
            }
        }
        Ok(entries)
    }
}

/// Handle for one listed entry; entries whose type cannot be read are
/// logged and skipped.
fn entry_handle(name: &str, path: PathBuf, file_type: std::io::Result<FileType>) -> Option<Handle> {
    let file_type = match file_type {
        Ok(file_type) => file_type,
        Err(e) => {
            tracing::warn!(entry = %path.display(), "skipping unreadable entry: {}", e);
            return None;
        }
    };
    let name = name.to_string();
    Some(if file_type.is_dir() {
        Handle::directory(HostDirectory { name, path })
    } else {
        Handle::file(HostFile { name, path })
    })
}

/// A file on the host filesystem.
#[derive(Debug, Clone)]
pub struct HostFile {
    name: String,
    path: PathBuf,
}

impl HostFile {
    /// Path on the host.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileHandle for HostFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> HandleId {
        HandleId::new(self.path.to_string_lossy())
    }

    async fn read_bytes(&self) -> Result<Vec<u8>, HandleError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HandleError::NotFound(self.path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_for_exclusive_write(&self) -> Result<Box<dyn WritableStream>, HandleError> {
        let mut swap = self.path.clone().into_os_string();
        swap.push(SWAP_SUFFIX);
        let swap = PathBuf::from(swap);
        // create_new fails if another writer holds the swap file.
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&swap)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => HandleError::PermissionDenied(format!(
                    "{} is already open for writing",
                    self.path.display()
                )),
                _ => HandleError::Io(e),
            })?;
        Ok(Box::new(HostWriter {
            target: self.path.clone(),
            swap,
            file: Some(file),
        }))
    }
}

struct HostWriter {
    target: PathBuf,
    swap: PathBuf,
    file: Option<tokio::fs::File>,
}

#[async_trait]
impl WritableStream for HostWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), HandleError> {
        let file = self.file.as_mut().ok_or(HandleError::Closed)?;
        file.write_all(data).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), HandleError> {
        let mut file = self.file.take().ok_or(HandleError::Closed)?;
        let committed = async {
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&self.swap, &self.target).await
        }
        .await;
        if let Err(e) = committed {
            let _ = tokio::fs::remove_file(&self.swap).await;
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for HostWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.swap);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let dir = std::env::temp_dir().join(format!(
            "capsule-host-{}-{}-{}",
            tag,
            std::process::id(),
            nanos
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_list_and_read() {
        let root = scratch_dir("list");
        std::fs::write(root.join("a.txt"), "alpha").unwrap();
        std::fs::create_dir(root.join("src")).unwrap();

        let dir = HostDirectory::open(&root).await.unwrap();
        let mut entries = dir.list_entries().await.unwrap();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].1.is_directory());
        assert!(entries[1].1.is_directory());

        let file = entries[0].1.as_file().unwrap();
        assert_eq!(file.read_bytes().await.unwrap(), b"alpha");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_unreadable_entry_is_skipped() {
        let root = scratch_dir("skip");
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(entry_handle("locked", root.join("locked"), Err(denied)).is_none());

        let file_type = std::fs::metadata(&root).unwrap().file_type();
        let handle = entry_handle("sub", root.join("sub"), Ok(file_type)).unwrap();
        assert!(handle.is_directory());
        assert_eq!(handle.name(), "sub");

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_write_replaces_on_close() {
        let root = scratch_dir("write");
        std::fs::write(root.join("a.txt"), "old").unwrap();

        let dir = HostDirectory::open(&root).await.unwrap();
        let entries = dir.list_entries().await.unwrap();
        let file = entries[0].1.as_file().unwrap();

        let mut stream = file.open_for_exclusive_write().await.unwrap();
        stream.write(b"new contents").await.unwrap();
        assert_eq!(std::fs::read_to_string(root.join("a.txt")).unwrap(), "old");
        stream.close().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(root.join("a.txt")).unwrap(),
            "new contents"
        );
        assert!(!root.join(format!("a.txt{}", SWAP_SUFFIX)).exists());

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_files() {
        let root = scratch_dir("reject");
        std::fs::write(root.join("plain"), "x").unwrap();
        assert!(matches!(
            HostDirectory::open(root.join("plain")).await,
            Err(HandleError::NotADirectory(_))
        ));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
