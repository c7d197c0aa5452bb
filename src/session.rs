//! A long-lived child program driven line by line, with its combined output
//! collected in the background.
//!
//! [`Session`] spawns the program with piped standard input and with standard
//! output and standard error merged into one pipe. A reader thread forwards
//! output chunks over a bounded channel; the owner drains them into an
//! [`OutputBuffer`], which keeps the recent output the way a terminal would
//! show it.

use crate::command::ExitCode;
use crate::error::ShellError;
use crate::external::exit_code;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use os_pipe::PipeReader;
use regex::Regex;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

/// Default bound on the bytes kept by an [`OutputBuffer`].
pub const OUTPUT_LIMIT: usize = 64 * 1024;

/// Chunks in flight between the reader thread and the owner.
const CHANNEL_CAPACITY: usize = 64;

const READ_CHUNK: usize = 4096;

const CLEAR_SCREEN: &[u8] = b"\x1b[2J";
const CURSOR_HOME: &[u8] = b"\x1b[H";

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid regex"));

/// Recent output of a session, bounded in size.
///
/// A screen-clear sequence discards everything received before it, together
/// with the cursor-home sequence that usually follows. Either sequence may be
/// split across chunks.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    data: Vec<u8>,
    /// Tail of the last chunk that may be the start of an escape sequence.
    pending: Vec<u8>,
    after_clear: bool,
    limit: usize,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::with_limit(OUTPUT_LIMIT)
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            pending: Vec::new(),
            after_clear: false,
            limit,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut start = 0;
        if let Some(pos) = find_last(&bytes, CLEAR_SCREEN) {
            self.data.clear();
            self.after_clear = true;
            start = pos + CLEAR_SCREEN.len();
        }

        if self.after_clear {
            let rest = &bytes[start..];
            if rest.starts_with(CURSOR_HOME) {
                start += CURSOR_HOME.len();
                self.after_clear = false;
            } else if CURSOR_HOME.starts_with(rest) {
                self.pending = rest.to_vec();
                return;
            } else {
                self.after_clear = false;
            }
        }

        let rest = &bytes[start..];
        let keep = partial_match_len(rest, CLEAR_SCREEN);
        let (complete, tail) = rest.split_at(rest.len() - keep);
        self.data.extend_from_slice(complete);
        self.pending = tail.to_vec();

        if self.data.len() > self.limit {
            let excess = self.data.len() - self.limit;
            self.data.drain(..excess);
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.pending.clear();
        self.after_clear = false;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// The text with ANSI colour and cursor sequences removed.
    pub fn plain_text(&self) -> String {
        ANSI_ESCAPE.replace_all(&self.text(), "").into_owned()
    }
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Length of the longest proper prefix of `pattern` that ends `bytes`.
fn partial_match_len(bytes: &[u8], pattern: &[u8]) -> usize {
    (1..pattern.len())
        .rev()
        .find(|&k| bytes.ends_with(&pattern[..k]))
        .unwrap_or(0)
}

/// A running child program with piped input and collected output.
pub struct Session {
    child: Child,
    stdin: Option<ChildStdin>,
    output: Receiver<Vec<u8>>,
    status: Option<ExitStatus>,
}

impl Session {
    /// Start `program`; its stdout and stderr share one pipe.
    pub fn spawn(program: impl AsRef<OsStr>, args: &[&str]) -> anyhow::Result<Self> {
        let program = program.as_ref();
        let (reader, writer) = os_pipe::pipe()?;
        let err_writer = writer.try_clone()?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(writer)
            .stderr(err_writer);
        let mut child = command
            .spawn()
            .map_err(|e| ShellError::launch(program.to_string_lossy(), e))?;
        // Our copies of the write end must go, or the reader never sees EOF.
        drop(command);

        let stdin = child.stdin.take();
        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        thread::Builder::new()
            .name("session-reader".into())
            .spawn(move || forward_output(reader, tx))?;

        log::debug!("session started: {program:?} (pid {})", child.id());
        Ok(Self {
            child,
            stdin,
            output: rx,
            status: None,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Write `line` and a newline to the program's input.
    pub fn send_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "session input is closed"))?;
        writeln!(stdin, "{line}")?;
        stdin.flush()
    }

    /// Close the program's input; it sees end of file.
    pub fn close_input(&mut self) {
        self.stdin = None;
    }

    /// Move every chunk received so far into `buffer`. Returns the number of bytes moved.
    pub fn drain_into(&self, buffer: &mut OutputBuffer) -> usize {
        self.output
            .try_iter()
            .map(|chunk| {
                buffer.push(&chunk);
                chunk.len()
            })
            .sum()
    }

    /// Wait up to `timeout` for output, then drain whatever arrived.
    ///
    /// Returns `false` when nothing arrived in time or the output is closed.
    pub fn wait_output(&self, buffer: &mut OutputBuffer, timeout: Duration) -> bool {
        match self.output.recv_timeout(timeout) {
            Ok(chunk) => {
                buffer.push(&chunk);
                self.drain_into(buffer);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Exit status if the program has finished, without blocking.
    ///
    /// Input forwarding stops once the program has exited.
    pub fn try_status(&mut self) -> io::Result<Option<ExitCode>> {
        if self.status.is_none() {
            if let Some(status) = self.child.try_wait()? {
                self.finished(status);
            }
        }
        Ok(self.status.map(exit_code))
    }

    /// Close input and block until the program exits.
    pub fn wait(&mut self) -> io::Result<ExitCode> {
        self.close_input();
        let status = match self.status {
            Some(status) => status,
            None => self.child.wait()?,
        };
        self.finished(status);
        Ok(exit_code(status))
    }

    /// Ask a running program to stop.
    pub fn terminate(&mut self) -> io::Result<()> {
        if self.try_status()?.is_some() {
            return Ok(());
        }
        log::debug!("terminating session pid {}", self.child.id());
        send_terminate(&mut self.child)
    }

    fn finished(&mut self, status: ExitStatus) {
        self.status = Some(status);
        self.stdin = None;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            log::debug!("cannot terminate session pid {}: {e}", self.child.id());
        }
        if self.status.is_none() {
            let _ = self.child.wait();
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM)?;
    Ok(())
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

fn forward_output(mut reader: PipeReader, tx: Sender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("session output closed: {e}");
                break;
            }
        }
    }
}
