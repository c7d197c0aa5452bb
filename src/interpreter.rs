use crate::command::{CommandFactory, Context, ExitCode, SUCCESS};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::error::{self, ShellError};
use crate::history::{FileHistory, HistoryStore, MemoryHistory};
use crate::io_adapters::{InheritedStdin, OutputSink};
use crate::parser;
use crate::pipeline::{self, PipelineRunner};
use anyhow::anyhow;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result};
use std::io::{self, Read, Write};
use std::thread;

/// [`CommandFactory`] for one of the command types of this crate: a built-in
/// or [`ExternalCommand`](crate::external::ExternalCommand).
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// A line-oriented shell: built-in and external commands, pipelines,
/// `&&` chains, redirections and command history.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried to create commands by name. See [`Default`] for the built-in
/// factories included out of the box.
///
/// Example
/// ```no_run
/// use terminal_shell::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run_line("echo hello && echo world");
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    history: Box<dyn HistoryStore>,
    config: ShellConfig,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
            history: Box::new(MemoryHistory::new()),
            config: ShellConfig::default(),
        }
    }

    /// Interpreter with the default commands, set up from `config`.
    ///
    /// History goes to `config.history_file` when one is given.
    pub fn from_config(config: ShellConfig) -> Self {
        let history: Box<dyn HistoryStore> = match &config.history_file {
            Some(path) => Box::new(FileHistory::new(path)),
            None => Box::new(MemoryHistory::new()),
        };
        Self::new(default_factories())
            .with_history(history)
            .with_config(config)
    }

    pub fn with_history(mut self, history: Box<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_config(mut self, config: ShellConfig) -> Self {
        self.config = config;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn history(&self) -> &[String] {
        self.history.entries()
    }

    /// Whether `exit` has been run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Whether `name` is handled in-process rather than by launching a program.
    pub fn is_builtin(&self, name: &str) -> bool {
        self.commands
            .iter()
            .any(|factory| factory.builtin_name() == Some(name))
    }

    /// Run a single command invocation by name with arguments.
    ///
    /// Returns the command's exit code or an error if the command cannot be created
    /// or fails to execute. Nothing is recorded in history.
    pub fn run(&mut self, name: &str, args: &[&str]) -> anyhow::Result<ExitCode> {
        let cmd = pipeline::create_command(&self.commands, &self.env, name, args)
            .ok_or_else(|| ShellError::CommandNotFound(name.to_string()))?;
        let mut ctx = Context {
            env: &mut self.env,
            history: self.history.entries(),
        };
        cmd.execute(
            Box::new(InheritedStdin::new()),
            Box::new(io::stdout()),
            &mut ctx,
        )
    }

    /// Evaluate one command line and return its status.
    ///
    /// Links joined by `&&` run left to right; the first non-zero status
    /// stops the line and is returned.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        self.run_chain(line, &OutputSink::Inherit)
    }

    /// Like [`Interpreter::run_line`], with the standard output of the line
    /// collected into `out` instead of the terminal.
    pub fn run_line_with_output(&mut self, line: &str, out: &mut dyn Write) -> anyhow::Result<ExitCode> {
        let (mut reader, writer) = os_pipe::pipe()?;
        let collector = thread::Builder::new()
            .name("output-collector".into())
            .spawn(move || {
                let mut captured = Vec::new();
                reader.read_to_end(&mut captured).map(|_| captured)
            })?;

        let sink = OutputSink::Pipe(writer);
        let status = self.run_chain(line, &sink);
        drop(sink);

        let captured = collector
            .join()
            .map_err(|_| anyhow!("output collector panicked"))??;
        out.write_all(&captured)?;
        out.flush()?;
        Ok(status)
    }

    fn run_chain(&mut self, line: &str, sink: &OutputSink) -> ExitCode {
        let parsed = match parser::parse_line(line) {
            Ok(parsed) => parsed,
            Err(e) => return error::report(&ShellError::from(e).into()),
        };
        let parsed = if self.config.colorize_ls {
            parsed.colorize_ls()
        } else {
            parsed
        };

        let mut status = SUCCESS;
        for link in &parsed.links {
            let mut runner = PipelineRunner {
                commands: &self.commands,
                env: &mut self.env,
                history: self.history.as_mut(),
                status: self.config.pipeline_status,
                sink,
            };
            status = runner.run(link);
            if status != SUCCESS {
                log::debug!("{:?} exited with {status}, skipping the rest of the line", link.text);
                break;
            }
            if self.env.should_exit {
                break;
            }
        }
        status
    }

    fn prompt(&self) -> String {
        let user = self.env.get_var("USER").unwrap_or_else(|| "user".to_string());
        let cwd = match self.env.home_dir() {
            Ok(home) => match self.env.current_dir.strip_prefix(&home) {
                Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
                Ok(rest) => format!("~/{}", rest.display()),
                Err(_) => self.env.current_dir.display().to_string(),
            },
            Err(_) => self.env.current_dir.display().to_string(),
        };
        format!("\x1b[1;32m{user}\x1b[0m-\x1b[1;34m{cwd}\x1b[0m$ ")
    }

    /// Read-Eval-Print Loop until `exit` or end of input.
    pub fn repl(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        while !self.env.should_exit {
            let readline = rl.readline(&self.prompt());
            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str())?;
                    let status = self.run_line(&line);
                    log::debug!("line finished with status {status}");
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}

/// The built-ins followed by the external command launcher.
fn default_factories() -> Vec<Box<dyn CommandFactory>> {
    use crate::builtin::builtin_factories;
    use crate::external::ExternalCommand;
    let mut factories = builtin_factories();
    factories.push(Box::new(Factory::<ExternalCommand>::default()));
    factories
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - built-ins: `about`, `help`, `clear`, `count`, `history`, `cd`, `exit`
    /// - external command launcher
    ///
    /// History is kept in memory.
    fn default() -> Self {
        Self::from_config(ShellConfig::default())
    }
}
