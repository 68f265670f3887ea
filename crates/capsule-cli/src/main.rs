//! Capsule CLI
//!
//! Usage:
//!   capsule run script.js [--json]   Run a script file in the sandbox
//!   capsule run -c "code" [--json]   Run an inline script
//!   capsule tree <dir>               Print the browsing tree, fully expanded
//!   capsule find <dir> <name>        Find the first file with that name
//!   capsule ls <dir> [path]          List a directory of the lookup tree
//!   capsule ext <dir> <.ext>...      List files with matching extensions
//!   capsule modules                  List the builtin modules

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, bail};
use capsule::handle::host::HostDirectory;
use capsule::{
    DirectoryTreeService, ExecutionSandbox, ExplorerFilterConfig, ModuleRegistry, OutputLevel, OutputSink, TreeNode,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: capsule <run|tree|find|ls|ext|modules> [args...]";

/// Script output to the terminal: log and info on stdout, the rest on stderr.
struct StdioSink;

impl OutputSink for StdioSink {
    fn emit(&self, level: OutputLevel, message: &str) {
        match level {
            OutputLevel::Log | OutputLevel::Info => {
                let _ = writeln!(io::stdout(), "{}", message);
            }
            OutputLevel::Warn | OutputLevel::Error => {
                let _ = writeln!(io::stderr(), "{}", message);
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr so script output stays clean on stdout
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        bail!(USAGE);
    };

    match command.as_str() {
        "run" => run(rest).await,
        "tree" => tree(rest).await,
        "find" => find(rest).await,
        "ls" => ls(rest).await,
        "ext" => ext(rest).await,
        "modules" => modules(),
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

async fn run(args: &[String]) -> anyhow::Result<()> {
    let json = args.iter().any(|a| a == "--json");
    let args: Vec<&String> = args.iter().filter(|a| *a != "--json").collect();

    let (script, filename) = match args.as_slice() {
        [flag, code, ..] if flag.as_str() == "-c" => ((*code).clone(), "index.js".to_string()),
        [file, ..] => {
            let script = std::fs::read_to_string(file).with_context(|| format!("capsule: {}", file))?;
            (script, (*file).clone())
        }
        [] => bail!("usage: capsule run <file> | -c <code> [--json]"),
    };

    let sandbox = ExecutionSandbox::new().with_sink(StdioSink);
    let result = sandbox.execute(&script, &filename).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn open(dir: Option<&String>) -> anyhow::Result<DirectoryTreeService> {
    let Some(dir) = dir else {
        bail!("missing directory argument\n{}", USAGE);
    };
    let root = HostDirectory::open(dir)
        .await
        .with_context(|| format!("capsule: cannot open {}", dir))?;
    Ok(DirectoryTreeService::new(Arc::new(root), ExplorerFilterConfig::default()).await)
}

async fn tree(args: &[String]) -> anyhow::Result<()> {
    let mut service = open(args.first()).await?;

    let mut pending: Vec<String> = directories(service.browse_tree());
    while let Some(path) = pending.pop() {
        service.expand(&path).await;
        if let Some(node) = service.node(&path) {
            pending.extend(directories(node.children()));
        }
    }

    let mut out = io::stdout().lock();
    print_nodes(&mut out, service.browse_tree(), 0)?;
    Ok(())
}

fn directories(nodes: &[TreeNode]) -> Vec<String> {
    nodes
        .iter()
        .filter(|n| n.is_directory())
        .map(|n| n.path.clone())
        .collect()
}

fn print_nodes(out: &mut impl Write, nodes: &[TreeNode], depth: usize) -> io::Result<()> {
    for node in nodes {
        let suffix = if node.is_directory() { "/" } else { "" };
        writeln!(out, "{}{}{}", "  ".repeat(depth), node.name, suffix)?;
        print_nodes(out, node.children(), depth + 1)?;
    }
    Ok(())
}

async fn find(args: &[String]) -> anyhow::Result<()> {
    let Some(name) = args.get(1) else {
        bail!("usage: capsule find <dir> <name>");
    };
    let service = open(args.first()).await?;
    match service.find_by_name(name) {
        Some(node) => {
            println!("{}", node.name);
            Ok(())
        }
        None => bail!("capsule: {}: not found", name),
    }
}

async fn ls(args: &[String]) -> anyhow::Result<()> {
    let service = open(args.first()).await?;
    let path = args.get(1).map(String::as_str).unwrap_or("");
    for node in service.list_directory(path) {
        let suffix = if node.is_directory { "/" } else { "" };
        println!("{}{}", node.name, suffix);
    }
    Ok(())
}

async fn ext(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 2 {
        bail!("usage: capsule ext <dir> <.ext>...");
    }
    let service = open(args.first()).await?;
    for name in service.list_matching_extensions(&args[1..]) {
        println!("{}", name);
    }
    Ok(())
}

fn modules() -> anyhow::Result<()> {
    let registry = ModuleRegistry::standard();
    println!("{}", serde_json::to_string_pretty(&registry.descriptors())?);
    Ok(())
}
