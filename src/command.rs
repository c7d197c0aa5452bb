//! The command abstraction shared by built-ins and external programs.

use crate::env::Environment;
use anyhow::Result;
use std::io::{Read, Write};
use std::process::Stdio;

/// Status of a command, stage, pipeline or line. Zero means success.
pub type ExitCode = i32;

pub const SUCCESS: ExitCode = 0;

/// Generic failure: a built-in failed, an argument was missing or the line did not parse.
pub const FAILURE: ExitCode = 1;

/// The program could not be found.
pub const NOT_FOUND: ExitCode = 127;

/// The shell itself failed to dispatch the command: the process could not be
/// created or a redirection file could not be opened. Never produced by a program.
pub const DISPATCH_FAILURE: ExitCode = -1;

/// Input stream of a command.
///
/// Built-ins read it directly; a child process gets it as its stdin through
/// [`Stdin::stdio`]. Files and pipe readers qualify through the blanket impl.
pub trait Stdin: Read + Send {
    /// Hand the stream over to a child process.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Read + Send + Into<Stdio>> Stdin for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Output stream of a command; the counterpart of [`Stdin`].
pub trait Stdout: Write + Send {
    /// Hand the stream over to a child process.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Write + Send + Into<Stdio>> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// State a command may read or change while it runs.
pub struct Context<'a> {
    /// Environment of the shell, or a private copy of it inside a multi-stage pipeline.
    pub env: &'a mut Environment,
    /// Recorded history in insertion order.
    pub history: &'a [String],
}

/// A command ready to run, arguments already bound.
///
/// `Send` so that pipeline stages can run on their own threads.
pub trait ExecutableCommand: Send {
    /// Run to completion and return the command's status.
    ///
    /// An `Err` means the command could not be run at all; the caller turns it
    /// into a status with [`crate::error::report`].
    fn execute(
        self: Box<Self>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
        ctx: &mut Context<'_>,
    ) -> Result<ExitCode>;
}

/// Creates commands by name.
///
/// The interpreter asks its factories in order; the first one to return a
/// command handles the name.
pub trait CommandFactory {
    /// A command for `name` bound to `args`, or `None` when this factory does
    /// not know the name.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;

    /// Name of the built-in this factory creates, `None` for factories that
    /// launch external programs.
    fn builtin_name(&self) -> Option<&'static str> {
        None
    }
}
