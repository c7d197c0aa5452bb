//! Command history: an append-only, in-order log of dispatched commands.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Built-ins that are never recorded.
pub const UNRECORDED_COMMANDS: &[&str] = &["history", "cd", "exit"];

/// Whether a command whose program is `program` belongs in history.
pub fn should_record(program: &str) -> bool {
    !program.is_empty() && !UNRECORDED_COMMANDS.contains(&program)
}

/// Sink for dispatched commands.
pub trait HistoryStore {
    /// Append one command.
    fn record(&mut self, command: &str);

    /// Every recorded command, oldest first.
    fn entries(&self) -> &[String];
}

/// History kept in memory for the lifetime of the interpreter.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Vec<String>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistory {
    fn record(&mut self, command: &str) {
        let command = command.trim();
        if !command.is_empty() {
            self.entries.push(command.to_string());
        }
    }

    fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// In-memory history that also appends every entry to a file, one per line.
///
/// Writing is best-effort: a file that cannot be opened or written is skipped
/// and the in-memory log stays authoritative.
#[derive(Debug)]
pub struct FileHistory {
    memory: MemoryHistory,
    path: PathBuf,
}

impl FileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            memory: MemoryHistory::new(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, command: &str) {
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{command}"));
        if let Err(e) = written {
            log::debug!("history: cannot append to {}: {e}", self.path.display());
        }
    }
}

impl HistoryStore for FileHistory {
    fn record(&mut self, command: &str) {
        let before = self.memory.entries().len();
        self.memory.record(command);
        if let Some(entry) = self.memory.entries().get(before) {
            self.persist(entry);
        }
    }

    fn entries(&self) -> &[String] {
        self.memory.entries()
    }
}
