//! Wiring and execution of one chain link: a single command, or several
//! stages connected by anonymous pipes.

use crate::command::{
    CommandFactory, Context, DISPATCH_FAILURE, ExecutableCommand, ExitCode, SUCCESS, Stdin, Stdout,
};
use crate::config::PipelineStatus;
use crate::env::Environment;
use crate::error::{self, ShellError};
use crate::history::{self, HistoryStore};
use crate::io_adapters::{InheritedStdin, MemReader, OutputSink, create_output, open_input};
use crate::parser::{Pipeline, Stage};
use os_pipe::PipeReader;
use std::thread;

/// Outcome of looking a stage's program up in the factories.
enum Resolved {
    Noop,
    Run(Box<dyn ExecutableCommand>),
    NotFound,
}

/// Ask each factory in turn for a command named `name`.
pub(crate) fn create_command(
    commands: &[Box<dyn CommandFactory>],
    env: &Environment,
    name: &str,
    args: &[&str],
) -> Option<Box<dyn ExecutableCommand>> {
    commands
        .iter()
        .find_map(|factory| factory.try_create(env, name, args))
}

fn resolve(commands: &[Box<dyn CommandFactory>], env: &Environment, stage: &Stage) -> Resolved {
    if stage.is_noop() {
        return Resolved::Noop;
    }
    let args: Vec<&str> = stage.args.iter().map(String::as_str).collect();
    match create_command(commands, env, &stage.program, &args) {
        Some(cmd) => Resolved::Run(cmd),
        None => Resolved::NotFound,
    }
}

fn report(err: ShellError) -> ExitCode {
    error::report(&err.into())
}

/// Everything a link needs from the interpreter while it runs.
pub(crate) struct PipelineRunner<'a> {
    pub(crate) commands: &'a [Box<dyn CommandFactory>],
    pub(crate) env: &'a mut Environment,
    pub(crate) history: &'a mut dyn HistoryStore,
    pub(crate) status: PipelineStatus,
    pub(crate) sink: &'a OutputSink,
}

impl PipelineRunner<'_> {
    pub(crate) fn run(&mut self, pipeline: &Pipeline) -> ExitCode {
        match pipeline.stages.as_slice() {
            [] => SUCCESS,
            [stage] => self.run_single(&pipeline.text, stage),
            stages => self.run_stages(&pipeline.text, stages),
        }
    }

    fn record(&mut self, text: &str, program: &str) {
        if history::should_record(program) {
            self.history.record(text);
        }
    }

    /// Run one stage in the shell's own control flow against the real environment.
    fn run_single(&mut self, text: &str, stage: &Stage) -> ExitCode {
        let cmd = match resolve(self.commands, self.env, stage) {
            Resolved::NotFound => {
                return report(ShellError::CommandNotFound(stage.program.clone()));
            }
            Resolved::Noop => None,
            Resolved::Run(cmd) => Some(cmd),
        };

        let stdin: Box<dyn Stdin> = match &stage.input {
            Some(path) => match open_input(path, self.env) {
                Ok(file) => file,
                Err(e) => return report(e),
            },
            None => Box::new(InheritedStdin::new()),
        };
        let stdout: Box<dyn Stdout> = match &stage.output {
            Some(path) => match create_output(path, self.env) {
                Ok(file) => file,
                Err(e) => return report(e),
            },
            None => match self.sink.open() {
                Ok(out) => out,
                Err(e) => return error::report(&e.into()),
            },
        };

        let Some(cmd) = cmd else {
            return SUCCESS;
        };

        self.record(text, &stage.program);
        log::debug!("running {:?} in the foreground", stage.program);

        let dir_before = self.env.current_dir.clone();
        let mut ctx = Context {
            env: self.env,
            history: self.history.entries(),
        };
        let code = match cmd.execute(stdin, stdout, &mut ctx) {
            Ok(code) => code,
            Err(e) => error::report(&e),
        };

        if self.env.current_dir != dir_before {
            if let Err(e) = std::env::set_current_dir(&self.env.current_dir) {
                log::debug!("cannot enter {}: {e}", self.env.current_dir.display());
            }
        }
        code
    }

    /// Run every stage on its own thread, connected by pipes, and wait for all of them.
    ///
    /// Every pipe and redirection file is opened before any stage starts; the
    /// link is recorded only if all of them opened and every program was found.
    fn run_stages(&mut self, text: &str, stages: &[Stage]) -> ExitCode {
        let resolved: Vec<Resolved> = stages
            .iter()
            .map(|stage| resolve(self.commands, self.env, stage))
            .collect();

        let prepared = self.wire(stages, resolved);
        let dispatched = prepared.iter().all(|p| !matches!(p, Prepared::Failed(_)));
        if let Some(first) = stages.iter().find(|s| !s.is_noop()) {
            if dispatched {
                self.record(text, &first.program);
            }
        }

        log::debug!("running {} stages", stages.len());
        let env: &Environment = &*self.env;
        let history = self.history.entries();

        let statuses: Vec<ExitCode> = thread::scope(|scope| {
            let handles: Vec<StageHandle<'_>> = prepared
                .into_iter()
                .enumerate()
                .map(|(i, stage)| {
                    let (cmd, stdin, stdout) = match stage {
                        Prepared::Ready { cmd, stdin, stdout } => (cmd, stdin, stdout),
                        Prepared::Noop => return StageHandle::Finished(SUCCESS),
                        Prepared::Failed(code) => return StageHandle::Finished(code),
                    };
                    let mut stage_env = env.clone();
                    let handle = thread::Builder::new()
                        .name(format!("stage-{i}"))
                        .spawn_scoped(scope, move || {
                            let mut ctx = Context {
                                env: &mut stage_env,
                                history,
                            };
                            match cmd.execute(stdin, stdout, &mut ctx) {
                                Ok(code) => code,
                                Err(e) => error::report(&e),
                            }
                        });
                    match handle {
                        Ok(handle) => StageHandle::Running(handle),
                        Err(e) => StageHandle::Finished(error::report(&e.into())),
                    }
                })
                .collect();

            handles.into_iter().map(StageHandle::wait).collect()
        });

        log::debug!("stage statuses: {statuses:?}");
        self.status.reduce(&statuses)
    }

    /// Connect the stages with pipes and open their redirection files.
    ///
    /// A stage that cannot be wired is reported and its channel ends are
    /// dropped, so its neighbours see end of file or a broken pipe.
    fn wire(&self, stages: &[Stage], resolved: Vec<Resolved>) -> Vec<Prepared> {
        let env: &Environment = &*self.env;
        let last = stages.len() - 1;
        let mut prepared = Vec::with_capacity(stages.len());
        let mut upstream: Option<PipeReader> = None;

        for (i, (stage, resolved)) in stages.iter().zip(resolved).enumerate() {
            let from_upstream = upstream.take();
            let mut to_downstream = None;
            if i < last {
                match os_pipe::pipe() {
                    Ok((reader, writer)) => {
                        upstream = Some(reader);
                        to_downstream = Some(writer);
                    }
                    Err(e) => {
                        prepared.push(Prepared::Failed(error::report(&e.into())));
                        break;
                    }
                }
            }

            let stdin: Box<dyn Stdin> = match (&stage.input, from_upstream) {
                (Some(path), _) => match open_input(path, env) {
                    Ok(file) => file,
                    Err(e) => {
                        prepared.push(Prepared::Failed(report(e)));
                        continue;
                    }
                },
                (None, Some(reader)) => Box::new(reader),
                (None, None) if i == 0 => Box::new(InheritedStdin::new()),
                (None, None) => Box::new(MemReader::empty()),
            };

            let stdout: Box<dyn Stdout> = match (&stage.output, to_downstream) {
                (Some(path), _) => match create_output(path, env) {
                    Ok(file) => file,
                    Err(e) => {
                        prepared.push(Prepared::Failed(report(e)));
                        continue;
                    }
                },
                (None, Some(writer)) => Box::new(writer),
                (None, None) => match self.sink.open() {
                    Ok(out) => out,
                    Err(e) => {
                        prepared.push(Prepared::Failed(error::report(&e.into())));
                        continue;
                    }
                },
            };

            prepared.push(match resolved {
                Resolved::Noop => Prepared::Noop,
                Resolved::NotFound => Prepared::Failed(report(ShellError::CommandNotFound(
                    stage.program.clone(),
                ))),
                Resolved::Run(cmd) => Prepared::Ready { cmd, stdin, stdout },
            });
        }
        prepared
    }
}

/// A stage with its streams in place, or the reason it will not run.
enum Prepared {
    Ready {
        cmd: Box<dyn ExecutableCommand>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
    },
    Noop,
    Failed(ExitCode),
}

enum StageHandle<'scope> {
    Finished(ExitCode),
    Running(thread::ScopedJoinHandle<'scope, ExitCode>),
}

impl StageHandle<'_> {
    fn wait(self) -> ExitCode {
        match self {
            StageHandle::Finished(code) => code,
            StageHandle::Running(handle) => handle.join().unwrap_or(DISPATCH_FAILURE),
        }
    }
}
