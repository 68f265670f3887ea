//! Where script console output goes.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Console output level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLevel {
    /// `console.log`, `console.dir`, `console.table`
    Log,
    /// `console.error` and failure reports
    Error,
    /// `console.warn`
    Warn,
    /// `console.info` and lifecycle notices
    Info,
}

impl OutputLevel {
    /// Lowercase level name.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputLevel::Log => "log",
            OutputLevel::Error => "error",
            OutputLevel::Warn => "warn",
            OutputLevel::Info => "info",
        }
    }
}

impl fmt::Display for OutputLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives formatted console lines from a script.
///
/// Closures `Fn(OutputLevel, &str)` implement this directly.
pub trait OutputSink: Send + Sync {
    /// Emit one formatted line.
    fn emit(&self, level: OutputLevel, message: &str);
}

impl<F> OutputSink for F
where
    F: Fn(OutputLevel, &str) + Send + Sync,
{
    fn emit(&self, level: OutputLevel, message: &str) {
        self(level, message)
    }
}

/// Forwards script output to `tracing` under the `capsule::script` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn emit(&self, level: OutputLevel, message: &str) {
        match level {
            OutputLevel::Log | OutputLevel::Info => {
                tracing::info!(target: "capsule::script", level = %level, "{}", message)
            }
            OutputLevel::Warn => tracing::warn!(target: "capsule::script", "{}", message),
            OutputLevel::Error => tracing::error!(target: "capsule::script", "{}", message),
        }
    }
}

/// One captured output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    /// Console level
    pub level: OutputLevel,
    /// Formatted text
    pub message: String,
}

/// Keeps every emitted line in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<OutputLine>>,
}

impl CollectingSink {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines emitted so far.
    pub fn lines(&self) -> Vec<OutputLine> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages emitted at `level`, in order.
    pub fn messages(&self, level: OutputLevel) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.level == level)
            .map(|line| line.message)
            .collect()
    }

    /// Remove and return everything collected.
    pub fn take(&self) -> Vec<OutputLine> {
        match self.lines.lock() {
            Ok(mut lines) => std::mem::take(&mut *lines),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl OutputSink for CollectingSink {
    fn emit(&self, level: OutputLevel, message: &str) {
        let line = OutputLine {
            level,
            message: message.to_string(),
        };
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}
