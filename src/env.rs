use crate::error::ShellError;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Shell state that commands see and may change.
///
/// Child processes are started with exactly `vars` as their environment and
/// `current_dir` as their working directory.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Variables exported to every launched program.
    pub vars: HashMap<String, String>,
    /// Directory relative paths and child processes start from.
    pub current_dir: PathBuf,
    /// Set by the `exit` built-in.
    pub should_exit: bool,
}

impl Environment {
    /// Snapshot of the running process: its variables and working directory.
    pub fn new() -> Self {
        Self {
            vars: stdenv::vars().collect(),
            current_dir: stdenv::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            should_exit: false,
        }
    }

    /// Value of `key`, from the shell's own variables or else the process environment.
    pub fn get_var(&self, key: &str) -> Option<String> {
        match self.vars.get(key) {
            Some(value) => Some(value.clone()),
            None => stdenv::var(key).ok(),
        }
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// The user's home directory: `HOME` if set and non-empty, otherwise the
    /// platform's notion of it.
    pub fn home_dir(&self) -> Result<PathBuf, ShellError> {
        match self.get_var("HOME") {
            Some(home) if !home.is_empty() => Ok(PathBuf::from(home)),
            _ => dirs::home_dir().ok_or(ShellError::HomeNotFound),
        }
    }

    /// Resolve `path` against the working directory of the shell.
    pub fn resolve_path(&self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        if path.is_absolute() {
            path
        } else {
            self.current_dir.join(path)
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
