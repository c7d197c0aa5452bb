use crate::command::{Stdin, Stdout};
use crate::env::Environment;
use crate::error::ShellError;
use os_pipe::PipeWriter;
use std::fs::File;
use std::io::{self, Cursor, Read, Result as IoResult};
use std::path::Path;
use std::process::Stdio;

/// Memory-backed reader.
///
/// Used as the input of a stage whose upstream channel is gone; external
/// programs get a null stdin in its place.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl From<MemReader> for Stdio {
    /// A child process cannot read from our memory, so it reads nothing.
    fn from(_: MemReader) -> Stdio {
        Stdio::null()
    }
}

/// The shell's own standard input, handed to the first stage of a line.
pub struct InheritedStdin(io::Stdin);

impl InheritedStdin {
    pub fn new() -> Self {
        Self(io::stdin())
    }
}

impl Default for InheritedStdin {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.0.read(buf)
    }
}

impl From<InheritedStdin> for Stdio {
    fn from(_: InheritedStdin) -> Stdio {
        Stdio::inherit()
    }
}

/// Where the final stage of a line writes its standard output.
pub(crate) enum OutputSink {
    /// The shell's own stdout.
    Inherit,
    /// A pipe drained by a collector; every stage gets its own handle.
    Pipe(PipeWriter),
}

impl OutputSink {
    pub(crate) fn open(&self) -> IoResult<Box<dyn Stdout>> {
        match self {
            OutputSink::Inherit => Ok(Box::new(io::stdout())),
            OutputSink::Pipe(writer) => Ok(Box::new(writer.try_clone()?)),
        }
    }
}

/// Open an input redirection target, relative to the shell's working directory.
pub(crate) fn open_input(path: &Path, env: &Environment) -> Result<Box<dyn Stdin>, ShellError> {
    let file = File::open(env.resolve_path(path)).map_err(|e| ShellError::open(path, e))?;
    Ok(Box::new(file))
}

/// Create or truncate an output redirection target.
pub(crate) fn create_output(path: &Path, env: &Environment) -> Result<Box<dyn Stdout>, ShellError> {
    let file = File::create(env.resolve_path(path)).map_err(|e| ShellError::open(path, e))?;
    Ok(Box::new(file))
}
