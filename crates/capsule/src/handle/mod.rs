//! Capability handles for host-managed files and directories.
//!
//! The host hands out opaque handles instead of raw paths. A directory handle
//! can enumerate its entries, a file handle can be read to bytes and opened
//! for an exclusive write. This module wraps both behind the [`Handle`] enum
//! so the rest of the crate never has to guess what kind of object it holds.
//!
//! Two host implementations ship with the crate:
//! - [`memory`] - an in-memory tree, used by tests and embedders
//! - [`host`] - a tree backed by a real directory on disk

pub mod host;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a capability handle.
#[derive(Debug, Error)]
pub enum HandleError {
    /// The underlying resource no longer exists
    #[error("not found: {0}")]
    NotFound(String),
    /// Expected a directory handle
    #[error("not a directory: {0}")]
    NotADirectory(String),
    /// Expected a file handle
    #[error("not a file: {0}")]
    NotAFile(String),
    /// The host refused the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Write attempted on a stream that was already closed
    #[error("stream closed")]
    Closed,
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Any other host failure
    #[error("host error: {0}")]
    Host(String),
}

/// Whether a handle refers to a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    /// A regular file
    File,
    /// A directory
    Directory,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::File => f.write_str("file"),
            HandleKind::Directory => f.write_str("directory"),
        }
    }
}

/// Stable identity of a host resource.
///
/// Two handles with the same id refer to the same file, even when the host
/// returned distinct handle objects for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(String);

impl HandleId {
    /// Create an id from any host-specific key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stream opened with exclusive write access to a file.
///
/// Nothing written becomes visible until [`close`](WritableStream::close)
/// succeeds.
#[async_trait]
pub trait WritableStream: Send {
    /// Append bytes to the pending contents.
    async fn write(&mut self, data: &[u8]) -> Result<(), HandleError>;

    /// Commit the pending contents and release the file.
    async fn close(&mut self) -> Result<(), HandleError>;
}

/// Capability to a single host file.
#[async_trait]
pub trait FileHandle: Send + Sync + fmt::Debug {
    /// Entry name, without any path.
    fn name(&self) -> &str;

    /// Identity used for caching.
    fn id(&self) -> HandleId;

    /// Read the full contents.
    async fn read_bytes(&self) -> Result<Vec<u8>, HandleError>;

    /// Open the file for an exclusive, replace-on-close write.
    async fn open_for_exclusive_write(&self) -> Result<Box<dyn WritableStream>, HandleError>;
}

/// Capability to a single host directory.
#[async_trait]
pub trait DirectoryHandle: Send + Sync + fmt::Debug {
    /// Entry name, without any path.
    fn name(&self) -> &str;

    /// Identity of the directory.
    fn id(&self) -> HandleId;

    /// Enumerate `(name, handle)` pairs in host order.
    async fn list_entries(&self) -> Result<Vec<(String, Handle)>, HandleError>;
}

/// A capability handle tagged with its kind.
#[derive(Debug, Clone)]
pub enum Handle {
    /// File capability
    File(Arc<dyn FileHandle>),
    /// Directory capability
    Directory(Arc<dyn DirectoryHandle>),
}

impl Handle {
    /// Wrap a file handle.
    pub fn file(handle: impl FileHandle + 'static) -> Self {
        Handle::File(Arc::new(handle))
    }

    /// Wrap a directory handle.
    pub fn directory(handle: impl DirectoryHandle + 'static) -> Self {
        Handle::Directory(Arc::new(handle))
    }

    /// The handle's kind.
    pub fn kind(&self) -> HandleKind {
        match self {
            Handle::File(_) => HandleKind::File,
            Handle::Directory(_) => HandleKind::Directory,
        }
    }

    /// Whether this is a directory handle.
    pub fn is_directory(&self) -> bool {
        matches!(self, Handle::Directory(_))
    }

    /// Entry name.
    pub fn name(&self) -> &str {
        match self {
            Handle::File(f) => f.name(),
            Handle::Directory(d) => d.name(),
        }
    }

    /// Resource identity.
    pub fn id(&self) -> HandleId {
        match self {
            Handle::File(f) => f.id(),
            Handle::Directory(d) => d.id(),
        }
    }

    /// The file capability, if this is a file.
    pub fn as_file(&self) -> Option<&Arc<dyn FileHandle>> {
        match self {
            Handle::File(f) => Some(f),
            Handle::Directory(_) => None,
        }
    }

    /// The directory capability, if this is a directory.
    pub fn as_directory(&self) -> Option<&Arc<dyn DirectoryHandle>> {
        match self {
            Handle::Directory(d) => Some(d),
            Handle::File(_) => None,
        }
    }
}
