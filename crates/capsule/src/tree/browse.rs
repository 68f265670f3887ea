//! Filtered, lazily expanded tree for the file browser.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use super::filter::ExplorerFilterConfig;
use crate::handle::{DirectoryHandle, Handle, HandleKind};

/// A node of the browsing projection.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    /// `"<prefix>/<name>"`
    pub id: String,
    /// Entry name
    pub name: String,
    /// File or directory
    pub kind: HandleKind,
    /// Slash-joined ancestor chain ending in this entry
    pub path: String,
    /// Capability to the entry
    #[serde(skip)]
    pub handle: Handle,
    /// Loaded children; `Some(empty)` for an unexpanded directory, `None` for files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
    /// Whether the browser shows this directory open
    pub expanded: bool,
}

impl TreeNode {
    fn new(prefix: &str, name: String, handle: Handle) -> Self {
        let kind = handle.kind();
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        Self {
            id: format!("{}/{}", prefix, name),
            name,
            kind,
            path,
            handle,
            children: (kind == HandleKind::Directory).then(Vec::new),
            expanded: false,
        }
    }

    /// Whether this node is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == HandleKind::Directory
    }

    /// Loaded children, empty for files and unloaded directories.
    pub fn children(&self) -> &[TreeNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Load children on first expansion, then flip `expanded`.
    ///
    /// Files are left untouched. Collapsing keeps the loaded children, so
    /// expanding again does not go back to the host.
    pub async fn expand(&mut self, filter: &ExplorerFilterConfig) {
        let Handle::Directory(dir) = &self.handle else {
            return;
        };
        if self.children().is_empty() {
            let loaded = build_tree(dir.as_ref(), &self.path, filter).await;
            self.children = Some(loaded);
        }
        self.expanded = !self.expanded;
    }
}

/// Enumerate one directory level into sorted browsing nodes.
///
/// Enumeration failures are logged and yield an empty listing.
pub async fn build_tree(
    dir: &dyn DirectoryHandle,
    prefix: &str,
    filter: &ExplorerFilterConfig,
) -> Vec<TreeNode> {
    let entries = match dir.list_entries().await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(directory = dir.name(), prefix, "failed to read directory: {}", e);
            return Vec::new();
        }
    };

    let mut nodes: Vec<TreeNode> = entries
        .into_iter()
        .filter(|(name, _)| !filter.should_skip(name))
        .map(|(name, handle)| TreeNode::new(prefix, name, handle))
        .collect();
    nodes.sort_by(compare_nodes);
    nodes
}

/// Build the top level of the browsing projection for a root directory.
pub async fn build_root(root: &Arc<dyn DirectoryHandle>, filter: &ExplorerFilterConfig) -> Vec<TreeNode> {
    build_tree(root.as_ref(), "", filter).await
}

/// Directories first, then names in [`compare_names`] order.
pub fn compare_nodes(a: &TreeNode, b: &TreeNode) -> Ordering {
    match (a.is_directory(), b.is_directory()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => compare_names(&a.name, &b.name),
    }
}

/// Case- and accent-aware name ordering, close to a root-locale collator.
///
/// Names compare in three passes:
/// 1. base letters, ignoring accents and case, with punctuation before
///    digits before letters
/// 2. accents, unaccented first
/// 3. case, lowercase first
///
/// The raw strings break any remaining tie.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    base_key(a)
        .cmp(base_key(b))
        .then_with(|| accent_key(a).cmp(accent_key(b)))
        .then_with(|| compare_case(a, b))
        .then_with(|| a.cmp(b))
}

fn char_class(c: char) -> u8 {
    if c.is_alphabetic() {
        2
    } else if c.is_numeric() {
        1
    } else {
        0
    }
}

fn base_key(s: &str) -> impl Iterator<Item = (u8, char)> + '_ {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| (char_class(c), c))
}

fn accent_key(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd().flat_map(char::to_lowercase)
}

fn compare_case(a: &str, b: &str) -> Ordering {
    for (x, y) in a.chars().zip(b.chars()) {
        match (x.is_lowercase(), y.is_lowercase()) {
            (true, false) if x.to_lowercase().eq(y.to_lowercase()) => return Ordering::Less,
            (false, true) if x.to_lowercase().eq(y.to_lowercase()) => return Ordering::Greater,
            _ => {}
        }
    }
    Ordering::Equal
}

/// Find a loaded node by its `path`.
pub fn find_node<'a>(nodes: &'a [TreeNode], path: &str) -> Option<&'a TreeNode> {
    for node in nodes {
        if node.path == path {
            return Some(node);
        }
        if is_ancestor(&node.path, path) {
            return find_node(node.children(), path);
        }
    }
    None
}

/// Mutable variant of [`find_node`].
pub fn find_node_mut<'a>(nodes: &'a mut [TreeNode], path: &str) -> Option<&'a mut TreeNode> {
    for node in nodes.iter_mut() {
        if node.path == path {
            return Some(node);
        }
        if is_ancestor(&node.path, path) {
            return node
                .children
                .as_deref_mut()
                .and_then(|children| find_node_mut(children, path));
        }
    }
    None
}

fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::handle::memory::MemoryDirectory;

    fn root() -> Arc<dyn DirectoryHandle> {
        Arc::new(
            MemoryDirectory::new("project")
                .with_file("readme.md", "# hi")
                .with_file("Cargo.toml", "")
                .with_directory(
                    MemoryDirectory::new("src")
                        .with_file("main.rs", "fn main() {}")
                        .with_directory(MemoryDirectory::new("bin")),
                )
                .with_file("a.txt", "")
                .with_directory(MemoryDirectory::new("Docs"))
                .with_directory(MemoryDirectory::new("node_modules"))
                .with_file(".env", "KEY=1")
                .with_file(".DS_Store", ""),
        )
    }

    fn names(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_directories_first_then_names() {
        let nodes = build_root(&root(), &ExplorerFilterConfig::default()).await;
        assert_eq!(
            names(&nodes),
            vec!["Docs", "src", ".env", "a.txt", "Cargo.toml", "readme.md"]
        );
        let first_file = nodes.iter().position(|n| !n.is_directory()).unwrap();
        assert!(nodes[..first_file].iter().all(TreeNode::is_directory));
        assert!(nodes[first_file..].iter().all(|n| !n.is_directory()));
    }

    #[test]
    fn test_compare_names_case_aware() {
        assert_eq!(compare_names("apple", "Banana"), Ordering::Less);
        assert_eq!(compare_names("Banana", "apple"), Ordering::Greater);
        assert_eq!(compare_names("a", "A"), Ordering::Less);
        assert_eq!(compare_names("A", "a"), Ordering::Greater);
        assert_eq!(compare_names("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_compare_names_accents_and_symbols() {
        assert_eq!(compare_names("éclair", "zebra"), Ordering::Less);
        assert_eq!(compare_names("Éclair", "eclairs"), Ordering::Less);
        assert_eq!(compare_names("resume", "résumé"), Ordering::Less);
        assert_eq!(compare_names("résumé", "resumes"), Ordering::Less);

        let mut names = vec!["zeta", "_private", "Ángel", "10.txt", "apple", "-draft", "9.txt", "beta"];
        names.sort_by(|a, b| compare_names(a, b));
        assert_eq!(
            names,
            vec!["-draft", "_private", "10.txt", "9.txt", "Ángel", "apple", "beta", "zeta"]
        );
    }

    #[tokio::test]
    async fn test_ids_and_paths() {
        let nodes = build_root(&root(), &ExplorerFilterConfig::default()).await;
        let src = nodes.iter().find(|n| n.name == "src").unwrap();
        assert_eq!(src.id, "/src");
        assert_eq!(src.path, "src");
        assert!(src.children.is_some());
        assert!(src.children().is_empty());

        let readme = nodes.iter().find(|n| n.name == "readme.md").unwrap();
        assert!(readme.children.is_none());
    }

    #[tokio::test]
    async fn test_expand_loads_with_prefix() {
        let filter = ExplorerFilterConfig::default();
        let mut nodes = build_root(&root(), &filter).await;
        let src = find_node_mut(&mut nodes, "src").unwrap();
        src.expand(&filter).await;

        assert!(src.expanded);
        assert_eq!(names(src.children()), vec!["bin", "main.rs"]);
        assert_eq!(src.children()[1].path, "src/main.rs");
        assert_eq!(src.children()[1].id, "src/main.rs");

        assert!(find_node(&nodes, "src/bin").is_some());
    }

    #[tokio::test]
    async fn test_expand_twice_toggles_without_refetch() {
        let filter = ExplorerFilterConfig::default();
        let dir = MemoryDirectory::new("lib").with_file("b.rs", "").with_file("a.rs", "");
        let mut node = TreeNode::new("", "lib".to_string(), Handle::directory(dir.clone()));

        node.expand(&filter).await;
        assert!(node.expanded);
        let before = names(node.children()).join(",");

        // A new entry on the host must not show up: children are not refetched.
        dir.insert(Handle::file(crate::handle::memory::MemoryFile::new("0.rs", "")))
            .await;
        node.expand(&filter).await;
        assert!(!node.expanded);
        assert_eq!(names(node.children()).join(","), before);

        node.expand(&filter).await;
        assert!(node.expanded);
        assert_eq!(names(node.children()).join(","), before);
    }

    #[tokio::test]
    async fn test_expand_file_is_noop() {
        let filter = ExplorerFilterConfig::default();
        let mut nodes = build_root(&root(), &filter).await;
        let readme = find_node_mut(&mut nodes, "readme.md").unwrap();
        readme.expand(&filter).await;
        assert!(!readme.expanded);
        assert!(readme.children.is_none());
    }

    #[tokio::test]
    async fn test_enumeration_failure_yields_empty() {
        let dir: Arc<dyn DirectoryHandle> = Arc::new(MemoryDirectory::failing("broken"));
        let nodes = build_root(&dir, &ExplorerFilterConfig::default()).await;
        assert!(nodes.is_empty());
    }
}
