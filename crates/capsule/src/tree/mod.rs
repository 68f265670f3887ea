//! Directory tree service.
//!
//! Serves two independently built projections of one root directory:
//! - the browsing projection ([`TreeNode`]): filtered, sorted, loaded lazily
//! - the lookup projection ([`TerminalTreeNode`]): unfiltered, built eagerly
//!
//! Neither is derived from the other. A new root or a full rebuild replaces
//! both; a filter change replaces only the browsing projection.

mod browse;
mod filter;
mod lookup;

pub use browse::{TreeNode, build_root, build_tree, compare_names, compare_nodes, find_node, find_node_mut};
pub use filter::{ALWAYS_HIDDEN, ALWAYS_SHOWN_DOTFILES, ExplorerFilterConfig, FilterUpdate};
pub use lookup::{TerminalTreeNode, build_lookup_tree, find_by_name, list_directory, list_matching_extensions};

use std::sync::Arc;

use crate::handle::DirectoryHandle;

/// Both tree projections over a single root directory.
pub struct DirectoryTreeService {
    root: Arc<dyn DirectoryHandle>,
    filter: ExplorerFilterConfig,
    browse: Vec<TreeNode>,
    lookup: Vec<TerminalTreeNode>,
}

impl std::fmt::Debug for DirectoryTreeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryTreeService")
            .field("root", &self.root.name())
            .field("filter", &self.filter)
            .field("browse_nodes", &self.browse.len())
            .field("lookup_nodes", &self.lookup.len())
            .finish()
    }
}

impl DirectoryTreeService {
    /// Build both projections for `root`.
    pub async fn new(root: Arc<dyn DirectoryHandle>, filter: ExplorerFilterConfig) -> Self {
        let mut service = Self {
            root,
            filter,
            browse: Vec::new(),
            lookup: Vec::new(),
        };
        service.rebuild().await;
        service
    }

    /// Discard and rebuild both projections from the root.
    pub async fn rebuild(&mut self) {
        let (browse, lookup) = futures::join!(
            build_root(&self.root, &self.filter),
            build_lookup_tree(Arc::clone(&self.root))
        );
        self.browse = browse;
        self.lookup = lookup;
        tracing::debug!(
            root = self.root.name(),
            browse = self.browse.len(),
            lookup = self.lookup.len(),
            "rebuilt directory trees"
        );
    }

    /// Rebuild only the browsing projection, e.g. after the host changed.
    pub async fn rebuild_browse(&mut self) {
        self.browse = build_root(&self.root, &self.filter).await;
    }

    /// Merge a filter update and rebuild the browsing projection.
    ///
    /// The lookup projection is left untouched. Returns whether the filter
    /// actually changed; the projection is rebuilt either way.
    pub async fn update_filter(&mut self, update: FilterUpdate) -> bool {
        let changed = self.filter.merge(update);
        tracing::info!(filter = ?self.filter, changed, "explorer filter updated");
        self.rebuild_browse().await;
        changed
    }

    /// The root directory capability.
    pub fn root(&self) -> &Arc<dyn DirectoryHandle> {
        &self.root
    }

    /// The active filter.
    pub fn filter(&self) -> &ExplorerFilterConfig {
        &self.filter
    }

    /// Top level of the browsing projection.
    pub fn browse_tree(&self) -> &[TreeNode] {
        &self.browse
    }

    /// Top level of the lookup projection.
    pub fn lookup_tree(&self) -> &[TerminalTreeNode] {
        &self.lookup
    }

    /// A loaded browsing node by path.
    pub fn node(&self, path: &str) -> Option<&TreeNode> {
        find_node(&self.browse, path)
    }

    /// Expand or collapse the browsing node at `path`.
    ///
    /// Returns the node's new `expanded` state, or `None` when no loaded node
    /// has that path.
    pub async fn expand(&mut self, path: &str) -> Option<bool> {
        let filter = self.filter;
        let node = find_node_mut(&mut self.browse, path)?;
        node.expand(&filter).await;
        Some(node.expanded)
    }

    /// First file named `name` anywhere under the root.
    pub fn find_by_name(&self, name: &str) -> Option<&TerminalTreeNode> {
        find_by_name(&self.lookup, name)
    }

    /// Every file name ending in one of `extensions`, in traversal order.
    pub fn list_matching_extensions<S: AsRef<str>>(&self, extensions: &[S]) -> Vec<String> {
        list_matching_extensions(&self.lookup, extensions)
    }

    /// Children of the directory at `path`, or empty if it does not resolve.
    pub fn list_directory(&self, path: &str) -> &[TerminalTreeNode] {
        list_directory(&self.lookup, path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::handle::Handle;
    use crate::handle::memory::{MemoryDirectory, MemoryFile};

    fn project() -> MemoryDirectory {
        MemoryDirectory::new("project")
            .with_file("index.js", "")
            .with_file(".secret", "")
            .with_directory(MemoryDirectory::new("node_modules").with_file("dep.js", ""))
            .with_directory(MemoryDirectory::new("lib").with_file("util.js", ""))
    }

    fn browse_names(service: &DirectoryTreeService) -> Vec<String> {
        service.browse_tree().iter().map(|n| n.name.clone()).collect()
    }

    #[tokio::test]
    async fn test_new_builds_both_projections() {
        let service = DirectoryTreeService::new(Arc::new(project()), ExplorerFilterConfig::default()).await;
        assert_eq!(browse_names(&service), vec!["lib", "index.js"]);
        assert_eq!(service.lookup_tree().len(), 4);
        assert_eq!(service.find_by_name("dep.js").unwrap().name, "dep.js");
    }

    #[tokio::test]
    async fn test_filter_change_rebuilds_browse_only() {
        let dir = project();
        let mut service = DirectoryTreeService::new(Arc::new(dir.clone()), ExplorerFilterConfig::default()).await;

        // Host changes after construction.
        dir.insert(Handle::file(MemoryFile::new("late.js", ""))).await;

        let changed = service
            .update_filter(FilterUpdate {
                show_node_modules: Some(true),
                show_hidden_files: Some(true),
                ..Default::default()
            })
            .await;
        assert!(changed);
        assert_eq!(
            browse_names(&service),
            vec!["lib", "node_modules", ".secret", "index.js", "late.js"]
        );
        // Lookup projection still reflects the original host state.
        assert!(service.find_by_name("late.js").is_none());

        service.rebuild().await;
        assert!(service.find_by_name("late.js").is_some());
    }

    #[tokio::test]
    async fn test_expand_by_path() {
        let mut service = DirectoryTreeService::new(Arc::new(project()), ExplorerFilterConfig::default()).await;
        assert_eq!(service.expand("lib").await, Some(true));
        assert_eq!(service.node("lib/util.js").unwrap().name, "util.js");
        assert_eq!(service.expand("lib").await, Some(false));
        assert_eq!(service.expand("missing").await, None);
    }

    #[tokio::test]
    async fn test_list_directory_and_extensions() {
        let service = DirectoryTreeService::new(Arc::new(project()), ExplorerFilterConfig::default()).await;
        let lib: Vec<&str> = service.list_directory("lib").iter().map(|n| n.name.as_str()).collect();
        assert_eq!(lib, vec!["util.js"]);
        assert_eq!(
            service.list_matching_extensions(&[".js"]),
            vec!["index.js", "dep.js", "util.js"]
        );
    }
}
