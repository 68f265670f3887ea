//! Capsule: capability-backed workspaces with a sandboxed script runner
//!
//! Capsule turns a host-granted directory capability into two tree
//! projections (a filtered, lazily expanded browsing tree and an eager,
//! unfiltered lookup tree), caches file contents for editing, and runs
//! untrusted scripts in a QuickJS sandbox whose only ambient authority is a
//! fixed set of emulated runtime modules.

mod config;
mod content;
mod workspace;

pub mod handle;
pub mod modules;
pub mod sandbox;
pub mod tree;

pub use config::SandboxConfig;
pub use content::{ContentCache, EditableFile, open};
pub use handle::{DirectoryHandle, FileHandle, Handle, HandleError, HandleId, HandleKind, WritableStream};
pub use modules::{BuiltinModule, ModuleDescriptor, ModuleError, ModuleRegistry};
pub use sandbox::{
    CollectingSink, ExecutionResult, ExecutionSandbox, ExecutionStats, OutputLevel, OutputLine, OutputSink,
    SandboxError, ScriptFailure, TracingSink,
};
pub use tree::{DirectoryTreeService, ExplorerFilterConfig, FilterUpdate, TerminalTreeNode, TreeNode};
pub use workspace::Workspace;
