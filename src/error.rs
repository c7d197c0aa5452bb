//! Error kinds reported by the shell and their exit statuses.

use crate::command::{DISPATCH_FAILURE, ExitCode, FAILURE, NOT_FOUND};
use crate::parser::ParseError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("parse error")]
    Parse(#[from] ParseError),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("{}: no such file or directory", .0.display())]
    FileNotFound(PathBuf),

    #[error("{}: permission denied", .0.display())]
    PermissionDenied(PathBuf),

    #[error("{}: no such directory", .0.display())]
    PathNotFound(PathBuf),

    #[error("failed to launch {program}")]
    LaunchFailure {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot determine home directory")]
    HomeNotFound,

    #[error("{}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ShellError {
    /// Classify a failure to open `path`.
    pub fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => ShellError::FileNotFound(path),
            io::ErrorKind::PermissionDenied => ShellError::PermissionDenied(path),
            _ => ShellError::Io { path, source },
        }
    }

    /// Classify a failure to spawn `program`.
    pub fn launch(program: impl Into<String>, source: io::Error) -> Self {
        let program = program.into();
        match source.kind() {
            io::ErrorKind::NotFound => ShellError::CommandNotFound(program),
            _ => ShellError::LaunchFailure { program, source },
        }
    }

    /// Exit status reported to the caller when dispatch fails with this error.
    pub fn status(&self) -> ExitCode {
        match self {
            ShellError::Parse(_) | ShellError::HomeNotFound | ShellError::PathNotFound(_) => {
                FAILURE
            }
            ShellError::CommandNotFound(_) => NOT_FOUND,
            ShellError::FileNotFound(_)
            | ShellError::PermissionDenied(_)
            | ShellError::LaunchFailure { .. }
            | ShellError::Io { .. } => DISPATCH_FAILURE,
        }
    }
}

/// Exit status for an error returned by a command.
///
/// Errors that are not a [`ShellError`] happened while wiring the command up
/// and are reported as dispatch failures.
pub fn status_of(err: &anyhow::Error) -> ExitCode {
    err.downcast_ref::<ShellError>()
        .map_or(DISPATCH_FAILURE, ShellError::status)
}

/// Print `err` on stderr and return its exit status.
pub(crate) fn report(err: &anyhow::Error) -> ExitCode {
    log::debug!("command failed: {err:?}");
    eprintln!("{err:#}");
    status_of(err)
}
