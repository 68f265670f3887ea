//! Eager, unfiltered tree for terminal-style lookups.
//!
//! Unlike the browsing projection this one applies no visibility policy and
//! is fully built up front, so queries never touch the host.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::Serialize;

use crate::handle::{DirectoryHandle, Handle};

/// A node of the lookup projection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalTreeNode {
    /// Entry name
    pub name: String,
    /// Capability to the entry
    #[serde(skip)]
    pub handle: Handle,
    /// Whether this entry is a directory
    pub is_directory: bool,
    /// Children in host enumeration order (empty for files)
    pub children: Vec<TerminalTreeNode>,
}

/// Recursively enumerate everything under `dir`.
///
/// Sibling directories are fetched concurrently, but the result keeps host
/// enumeration order. A directory that fails to enumerate is logged and
/// appears with no children.
pub fn build_lookup_tree(dir: Arc<dyn DirectoryHandle>) -> BoxFuture<'static, Vec<TerminalTreeNode>> {
    async move {
        let entries = match dir.list_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(directory = dir.name(), "failed to read directory: {}", e);
                return Vec::new();
            }
        };

        let subtrees = entries.iter().map(|(_, handle)| match handle {
            Handle::Directory(sub) => build_lookup_tree(Arc::clone(sub)),
            Handle::File(_) => futures::future::ready(Vec::new()).boxed(),
        });
        let children = join_all(subtrees).await;

        entries
            .into_iter()
            .zip(children)
            .map(|((name, handle), children)| TerminalTreeNode {
                name,
                is_directory: handle.is_directory(),
                handle,
                children,
            })
            .collect()
    }
    .boxed()
}

/// Depth-first search for the first file called `name`.
pub fn find_by_name<'a>(nodes: &'a [TerminalTreeNode], name: &str) -> Option<&'a TerminalTreeNode> {
    for node in nodes {
        if node.is_directory {
            if let Some(found) = find_by_name(&node.children, name) {
                return Some(found);
            }
        } else if node.name == name {
            return Some(node);
        }
    }
    None
}

/// Names of every file whose name ends with one of `extensions`, in
/// depth-first traversal order.
pub fn list_matching_extensions<S: AsRef<str>>(nodes: &[TerminalTreeNode], extensions: &[S]) -> Vec<String> {
    let mut out = Vec::new();
    collect_matching(nodes, extensions, &mut out);
    out
}

fn collect_matching<S: AsRef<str>>(nodes: &[TerminalTreeNode], extensions: &[S], out: &mut Vec<String>) {
    for node in nodes {
        if node.is_directory {
            collect_matching(&node.children, extensions, out);
        } else if extensions.iter().any(|ext| node.name.ends_with(ext.as_ref())) {
            out.push(node.name.clone());
        }
    }
}

/// Children of the directory at a slash-separated `path`.
///
/// Empty segments are ignored, so `""` and `"/"` list the root. Any segment
/// that does not name a directory yields an empty listing.
pub fn list_directory<'a>(nodes: &'a [TerminalTreeNode], path: &str) -> &'a [TerminalTreeNode] {
    let mut current = nodes;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match current
            .iter()
            .find(|node| node.is_directory && node.name == segment)
        {
            Some(dir) => current = &dir.children,
            None => return &[],
        }
    }
    current
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::handle::memory::MemoryDirectory;

    fn tree() -> Arc<dyn DirectoryHandle> {
        Arc::new(
            MemoryDirectory::new("root")
                .with_file("a.js", "")
                .with_file("b.ts", "")
                .with_directory(MemoryDirectory::new("c").with_file("d.js", ""))
                .with_directory(
                    MemoryDirectory::new(".git").with_file("HEAD", "ref: refs/heads/main"),
                )
                .with_directory(
                    MemoryDirectory::new("node_modules")
                        .with_directory(MemoryDirectory::new("left-pad").with_file("index.js", "")),
                ),
        )
    }

    #[tokio::test]
    async fn test_lookup_is_unfiltered() {
        let nodes = build_lookup_tree(tree()).await;
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a.js", "b.ts", "c", ".git", "node_modules"]);
        assert_eq!(nodes[4].children[0].children[0].name, "index.js");
    }

    #[tokio::test]
    async fn test_list_matching_extensions_traversal_order() {
        let root: Arc<dyn DirectoryHandle> = Arc::new(
            MemoryDirectory::new("root")
                .with_file("a.js", "")
                .with_file("b.ts", "")
                .with_directory(MemoryDirectory::new("c").with_file("d.js", "")),
        );
        let nodes = build_lookup_tree(root).await;
        assert_eq!(list_matching_extensions(&nodes, &[".js"]), vec!["a.js", "d.js"]);
        assert_eq!(
            list_matching_extensions(&nodes, &[".js", ".ts"]),
            vec!["a.js", "b.ts", "d.js"]
        );
        assert!(list_matching_extensions(&nodes, &[".py"]).is_empty());
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let nodes = build_lookup_tree(tree()).await;
        assert_eq!(find_by_name(&nodes, "d.js").unwrap().name, "d.js");
        assert_eq!(find_by_name(&nodes, "HEAD").unwrap().name, "HEAD");
        // Directories are never returned.
        assert!(find_by_name(&nodes, "c").is_none());
        assert!(find_by_name(&nodes, "missing.txt").is_none());
    }

    #[tokio::test]
    async fn test_list_directory() {
        let nodes = build_lookup_tree(tree()).await;
        assert_eq!(list_directory(&nodes, "").len(), 5);
        assert_eq!(list_directory(&nodes, "/").len(), 5);
        assert_eq!(list_directory(&nodes, "c")[0].name, "d.js");
        assert_eq!(list_directory(&nodes, "node_modules/left-pad")[0].name, "index.js");
        assert!(list_directory(&nodes, "c/nope").is_empty());
        // A file is not a directory to descend into.
        assert!(list_directory(&nodes, "a.js").is_empty());
    }

    #[tokio::test]
    async fn test_failing_subdirectory_is_empty() {
        let root: Arc<dyn DirectoryHandle> = Arc::new(
            MemoryDirectory::new("root")
                .with_directory(MemoryDirectory::failing("locked"))
                .with_file("ok.txt", ""),
        );
        let nodes = build_lookup_tree(root).await;
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].is_directory);
        assert!(nodes[0].children.is_empty());
    }
}
