use crate::command::{CommandFactory, Context, ExecutableCommand, ExitCode, Stdin, Stdout};
use crate::env::Environment;
use crate::error::ShellError;
use crate::interpreter::Factory;
use anyhow::Result;
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};
use std::process::ExitStatus;

/// A program launched as a child process.
pub struct ExternalCommand {
    /// Name as typed, used in messages.
    program: String,
    executable: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, executable: PathBuf, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            executable,
            args,
        }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let search_path = env.get_var("PATH").unwrap_or_default();
        let executable = resolve_program(name, OsStr::new(&search_path), &env.current_dir)?;
        log::debug!("{name} resolved to {}", executable.display());
        Some(Box::new(ExternalCommand::new(
            name,
            executable,
            args.iter().map(OsString::from).collect(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
        ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        let mut child = std::process::Command::new(&self.executable)
            .args(&self.args)
            .stdin(stdin.stdio())
            .stdout(stdout.stdio())
            .env_clear()
            .envs(&ctx.env.vars)
            .current_dir(&ctx.env.current_dir)
            .spawn()
            .map_err(|e| ShellError::launch(&self.program, e))?;
        log::debug!("{} started as pid {}", self.program, child.id());
        let status = child.wait()?;
        Ok(exit_code(status))
    }
}

/// Status of a finished child: its own exit code, or `128 + signal` when it was killed.
pub fn exit_code(status: ExitStatus) -> ExitCode {
    status.code().unwrap_or_else(|| signal_status(status))
}

#[cfg(unix)]
fn signal_status(status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => 128 + signal,
        None if status.core_dumped() => 255,
        None => -1,
    }
}

#[cfg(not(unix))]
fn signal_status(_status: ExitStatus) -> ExitCode {
    -1
}

/// Locate the executable for `name`.
///
/// A name with a directory part (`/usr/bin/env`, `bin/tool`, `./run`) is a
/// path, relative ones taken from `cwd`; it must be a regular file. A bare
/// name is looked up in each entry of `search_path` in order, skipping files
/// that cannot be executed.
pub fn resolve_program(name: &str, search_path: &OsStr, cwd: &Path) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(Component::Normal(bare)), None) => {
            if cfg!(not(unix)) && cwd.join(bare).is_file() {
                return Some(cwd.join(bare));
            }
            std::env::split_paths(search_path)
                .map(|dir| dir.join(bare))
                .find(|candidate| is_executable(candidate))
        }
        _ => Some(cwd.join(path)).filter(|candidate| candidate.is_file()),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
