//! Visibility policy for the browsing projection.

use serde::{Deserialize, Serialize};

/// Dotfiles and dot-directories that are shown even when hidden files are off.
///
/// Matching is by prefix, so `.env.local` and `.eslintrc.json` count too.
pub const ALWAYS_SHOWN_DOTFILES: &[&str] = &[".env", ".gitignore", ".eslintrc", ".prettierrc", ".vscode"];

/// Build and tool output directories that are never shown.
pub const ALWAYS_HIDDEN: &[&str] = &["dist", "build", ".next", ".nuxt", "coverage", ".nyc_output"];

/// Which entries the file browser shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplorerFilterConfig {
    /// Show dotfiles outside the allow-list
    pub show_hidden_files: bool,
    /// Show `node_modules`
    pub show_node_modules: bool,
    /// Show `.git`
    pub show_git_files: bool,
}

/// A partial update merged into an [`ExplorerFilterConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterUpdate {
    /// New value for `show_hidden_files`
    pub show_hidden_files: Option<bool>,
    /// New value for `show_node_modules`
    pub show_node_modules: Option<bool>,
    /// New value for `show_git_files`
    pub show_git_files: Option<bool>,
}

impl ExplorerFilterConfig {
    /// Whether an entry with this name is left out of the browsing projection.
    pub fn should_skip(&self, name: &str) -> bool {
        if name.starts_with('.')
            && !self.show_hidden_files
            && !ALWAYS_SHOWN_DOTFILES
                .iter()
                .any(|allowed| name.starts_with(allowed))
        {
            return true;
        }

        if name == "node_modules" && !self.show_node_modules {
            return true;
        }

        if name == ".git" && !self.show_git_files {
            return true;
        }

        ALWAYS_HIDDEN.contains(&name)
    }

    /// Merge a partial update. Returns whether anything changed.
    pub fn merge(&mut self, update: FilterUpdate) -> bool {
        let before = *self;
        if let Some(v) = update.show_hidden_files {
            self.show_hidden_files = v;
        }
        if let Some(v) = update.show_node_modules {
            self.show_node_modules = v;
        }
        if let Some(v) = update.show_git_files {
            self.show_git_files = v;
        }
        before != *self
    }
}
