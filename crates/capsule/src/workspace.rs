//! Editor session over a selected root directory.
//!
//! Ties the tree service, the content cache and the active editable file
//! together with one lifecycle: everything is created when a root is
//! selected and dropped on [`Workspace::reset`]. The explorer filter survives
//! resets.

use std::sync::Arc;

use crate::content::{self, ContentCache, EditableFile};
use crate::handle::DirectoryHandle;
use crate::tree::{DirectoryTreeService, ExplorerFilterConfig, FilterUpdate, TerminalTreeNode, TreeNode};

/// State of one editing session.
#[derive(Debug, Default)]
pub struct Workspace {
    filter: ExplorerFilterConfig,
    tree: Option<DirectoryTreeService>,
    cache: ContentCache,
    current_file: Option<EditableFile>,
    editor_content: String,
}

impl Workspace {
    /// Create a workspace with no root selected.
    pub fn new(filter: ExplorerFilterConfig) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Select a root directory and build both tree projections for it.
    pub async fn select_root(&mut self, root: Arc<dyn DirectoryHandle>) {
        tracing::info!(root = root.name(), "root directory selected");
        self.tree = Some(DirectoryTreeService::new(root, self.filter).await);
    }

    /// Whether a root directory is selected.
    pub fn has_selected_directory(&self) -> bool {
        self.tree.is_some()
    }

    /// Rebuild both projections from the selected root.
    pub async fn load_tree(&mut self) {
        if let Some(tree) = self.tree.as_mut() {
            tree.rebuild().await;
        }
    }

    /// The tree service, when a root is selected.
    pub fn tree(&self) -> Option<&DirectoryTreeService> {
        self.tree.as_ref()
    }

    /// Top level of the browsing projection.
    pub fn file_tree(&self) -> &[TreeNode] {
        self.tree.as_ref().map(DirectoryTreeService::browse_tree).unwrap_or(&[])
    }

    /// Top level of the lookup projection.
    pub fn terminal_tree(&self) -> &[TerminalTreeNode] {
        self.tree.as_ref().map(DirectoryTreeService::lookup_tree).unwrap_or(&[])
    }

    /// Toggle the folder at `path`, loading its children on first use.
    pub async fn expand_folder(&mut self, path: &str) -> Option<bool> {
        let tree = self.tree.as_mut()?;
        let expanded = tree.expand(path).await;
        if expanded.is_none() {
            tracing::warn!(path, "cannot expand folder: not loaded");
        }
        expanded
    }

    /// Open the file at `path` and make it the active file.
    ///
    /// Returns `None` if no loaded file node has that path.
    pub async fn open_file(&mut self, path: &str) -> Option<&EditableFile> {
        let node = self.tree.as_ref()?.node(path)?.clone();
        tracing::info!(file = %node.name, "opening file");
        let file = content::open(&mut self.cache, &node).await?;
        self.editor_content = file.content.clone();
        self.current_file = Some(file);
        self.current_file.as_ref()
    }

    /// Replace the editor content in memory and mark the active file modified.
    pub fn update_content(&mut self, text: impl Into<String>) {
        let text = text.into();
        if let Some(file) = self.current_file.as_mut() {
            file.content = text.clone();
            file.modified = true;
            self.cache.update(file.handle.id(), text.clone());
        }
        self.editor_content = text;
    }

    /// Write the editor content to the active file.
    ///
    /// Returns `false` when no file is open or the host write failed.
    pub async fn save(&mut self) -> bool {
        let Some(file) = self.current_file.as_mut() else {
            return false;
        };
        let saved = self.cache.write(file.handle.as_ref(), &self.editor_content).await;
        if saved {
            file.modified = false;
        }
        saved
    }

    /// Merge a filter update and rebuild the browsing projection.
    pub async fn update_filter(&mut self, update: FilterUpdate) {
        self.filter.merge(update);
        if let Some(tree) = self.tree.as_mut() {
            tree.update_filter(update).await;
        }
    }

    /// The active explorer filter.
    pub fn filter(&self) -> &ExplorerFilterConfig {
        &self.filter
    }

    /// The active file.
    pub fn current_file(&self) -> Option<&EditableFile> {
        self.current_file.as_ref()
    }

    /// Current editor content.
    pub fn editor_content(&self) -> &str {
        &self.editor_content
    }

    /// The content cache.
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Drop the root, both projections, the cache and the active file.
    pub fn reset(&mut self) {
        self.tree = None;
        self.cache.clear();
        self.current_file = None;
        self.editor_content.clear();
        tracing::info!("workspace reset");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::handle::memory::{MemoryDirectory, MemoryFile};
    use crate::handle::{FileHandle, Handle};

    async fn workspace_with(file: MemoryFile) -> Workspace {
        let root = MemoryDirectory::new("project")
            .with_handle(Handle::file(file))
            .with_directory(MemoryDirectory::new("src").with_file("lib.rs", "pub fn f() {}"));
        let mut ws = Workspace::default();
        ws.select_root(Arc::new(root)).await;
        ws
    }

    #[tokio::test]
    async fn test_open_update_save() {
        let file = MemoryFile::new("notes.md", "draft");
        let mut ws = workspace_with(file.clone()).await;
        assert!(ws.has_selected_directory());

        let opened = ws.open_file("notes.md").await.unwrap();
        assert_eq!(opened.content, "draft");
        assert!(!opened.modified);
        assert_eq!(ws.editor_content(), "draft");

        ws.update_content("final");
        assert!(ws.current_file().unwrap().modified);
        assert_eq!(ws.cache().get(&file.id()), Some("final"));
        // Nothing reached the host yet.
        assert_eq!(file.contents().await, b"draft");

        assert!(ws.save().await);
        assert!(!ws.current_file().unwrap().modified);
        assert_eq!(file.contents().await, b"final");
    }

    #[tokio::test]
    async fn test_save_without_file() {
        let mut ws = Workspace::default();
        assert!(!ws.save().await);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_modified() {
        let file = MemoryFile::new("notes.md", "draft");
        let mut ws = workspace_with(file.clone()).await;
        ws.open_file("notes.md").await.unwrap();
        ws.update_content("edit");
        file.set_fail_writes(true);

        assert!(!ws.save().await);
        assert!(ws.current_file().unwrap().modified);
    }

    #[tokio::test]
    async fn test_open_nested_after_expand() {
        let mut ws = workspace_with(MemoryFile::new("a.txt", "")).await;
        assert!(ws.open_file("src/lib.rs").await.is_none());
        assert_eq!(ws.expand_folder("src").await, Some(true));
        assert_eq!(ws.open_file("src/lib.rs").await.unwrap().content, "pub fn f() {}");
        // Directories cannot be opened.
        assert!(ws.open_file("src").await.is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_everything_but_filter() {
        let mut ws = workspace_with(MemoryFile::new("a.txt", "x")).await;
        ws.update_filter(FilterUpdate {
            show_hidden_files: Some(true),
            ..Default::default()
        })
        .await;
        ws.open_file("a.txt").await.unwrap();

        ws.reset();
        assert!(!ws.has_selected_directory());
        assert!(ws.file_tree().is_empty());
        assert!(ws.terminal_tree().is_empty());
        assert!(ws.current_file().is_none());
        assert_eq!(ws.editor_content(), "");
        assert!(ws.cache().is_empty());
        assert!(ws.filter().show_hidden_files);
    }
}
