use crate::command::{
    CommandFactory, Context, ExecutableCommand, ExitCode, FAILURE, SUCCESS, Stdin, Stdout,
};
use crate::env::Environment;
use crate::error::ShellError;
use crate::interpreter::Factory;
use anyhow::{Context as _, Result};
use argh::{EarlyExit, FromArgs};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;

/// ANSI sequence emitted by `clear`: erase the screen, then move the cursor home.
pub const CLEAR_SEQUENCE: &str = "\x1b[2J\x1b[H";

const RULE: &str = "════════════════════════════════════════════════════════════════";

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs + Send {
    /// Canonical name of the command, e.g. "count" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and shell state.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        ctx: &mut Context<'_>,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        mut stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        let result = <T as BuiltinCommand>::execute(*self, &mut stdin, &mut stdout, ctx)
            .and_then(|code| {
                stdout.flush()?;
                Ok(code)
            });
        match result {
            Ok(x) => Ok(x),
            Err(e) => {
                log::debug!("{} failed: {e:?}", T::name());
                eprintln!("{}: {:#}", T::name(), e);
                Ok(FAILURE)
            }
        }
    }
}

/// Stands in for a builtin whose arguments did not parse, or that was asked for `--help`.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        _ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        if self.is_error {
            eprint!("{}", self.output);
            Ok(FAILURE)
        } else {
            stdout.write_all(self.output.as_bytes())?;
            stdout.flush()?;
            Ok(SUCCESS)
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }

    fn builtin_name(&self) -> Option<&'static str> {
        Some(T::name())
    }
}

/// Factories for every built-in, in lookup order.
pub(crate) fn builtin_factories() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<About>::default()),
        Box::new(Factory::<Help>::default()),
        Box::new(Factory::<Clear>::default()),
        Box::new(Factory::<Count>::default()),
        Box::new(Factory::<History>::default()),
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Exit>::default()),
    ]
}

#[derive(FromArgs)]
/// Display information about this shell.
pub struct About {}

impl BuiltinCommand for About {
    fn name() -> &'static str {
        "about"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        writeln!(stdout)?;
        writeln!(stdout, "{RULE}")?;
        writeln!(stdout, "  terminal_shell v{}", env!("CARGO_PKG_VERSION"))?;
        writeln!(stdout)?;
        writeln!(stdout, "  A line-oriented command shell with built-in commands,")?;
        writeln!(stdout, "  external programs, pipelines, && chaining, redirection")?;
        writeln!(stdout, "  and command history.")?;
        writeln!(stdout, "{RULE}")?;
        writeln!(stdout)?;
        Ok(SUCCESS)
    }
}

#[derive(FromArgs)]
/// Display the command reference.
pub struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        writeln!(stdout)?;
        writeln!(stdout, "{RULE}")?;
        writeln!(stdout, "                    AVAILABLE COMMANDS")?;
        writeln!(stdout, "{RULE}")?;
        writeln!(stdout, "\nBUILT-IN COMMANDS:")?;
        writeln!(stdout, "  about                - Display information about this shell")?;
        writeln!(stdout, "  help                 - Display this help message")?;
        writeln!(stdout, "  clear                - Clear the terminal screen")?;
        writeln!(stdout, "  cd [directory]       - Change the current directory")?;
        writeln!(stdout, "  count <file>         - Count lines, words and characters in a file")?;
        writeln!(stdout, "  history              - Display command history")?;
        writeln!(stdout, "  exit                 - Exit the shell")?;
        writeln!(stdout, "\nOPERATORS:")?;
        writeln!(stdout, "  a && b               - Run b only if a succeeded")?;
        writeln!(stdout, "  a | b                - Feed the output of a into b")?;
        writeln!(stdout, "  a > file, a < file   - Redirect output to / input from a file")?;
        writeln!(stdout, "\nEXTERNAL COMMANDS:")?;
        writeln!(stdout, "  Any program found in PATH, e.g. ls, echo, cat, grep.")?;
        writeln!(stdout, "\n{RULE}")?;
        writeln!(stdout)?;
        Ok(SUCCESS)
    }
}

#[derive(FromArgs)]
/// Clear the terminal screen.
pub struct Clear {}

impl BuiltinCommand for Clear {
    fn name() -> &'static str {
        "clear"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        stdout.write_all(CLEAR_SEQUENCE.as_bytes())?;
        Ok(SUCCESS)
    }
}

/// Line, word and byte counts of a byte stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub lines: usize,
    pub words: usize,
    pub bytes: usize,
}

impl FileStats {
    /// Count `reader` to its end.
    ///
    /// A line ends at each `\n`; a non-empty stream that does not end with a
    /// newline has one more, unterminated, line.
    pub fn read_from(mut reader: impl Read) -> io::Result<Self> {
        let mut stats = FileStats::default();
        let mut buf = [0u8; 8192];
        let mut in_word = false;
        let mut last = None;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            for &byte in &buf[..n] {
                if byte == b'\n' {
                    stats.lines += 1;
                }
                if byte.is_ascii_whitespace() {
                    in_word = false;
                } else if !in_word {
                    stats.words += 1;
                    in_word = true;
                }
            }
            stats.bytes += n;
            last = Some(buf[n - 1]);
        }

        if matches!(last, Some(byte) if byte != b'\n') {
            stats.lines += 1;
        }
        Ok(stats)
    }
}

#[derive(FromArgs)]
/// Count lines, words and characters in a file.
pub struct Count {
    #[argh(positional)]
    /// file to inspect, relative to the current directory.
    pub file: String,
}

impl BuiltinCommand for Count {
    fn name() -> &'static str {
        "count"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        let path = ctx.env.resolve_path(&self.file);
        let file = File::open(&path).map_err(|e| ShellError::open(&self.file, e))?;
        let stats = FileStats::read_from(BufReader::new(file))
            .with_context(|| format!("cannot read {}", self.file))?;

        writeln!(stdout)?;
        writeln!(stdout, "File: {}", self.file)?;
        writeln!(stdout, "  Lines:      {}", stats.lines)?;
        writeln!(stdout, "  Words:      {}", stats.words)?;
        writeln!(stdout, "  Characters: {}", stats.bytes)?;
        writeln!(stdout)?;
        Ok(SUCCESS)
    }
}

#[derive(FromArgs)]
/// Display the commands entered so far.
pub struct History {}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        if ctx.history.is_empty() {
            writeln!(stdout, "\nNo command history yet.\n")?;
            return Ok(SUCCESS);
        }

        writeln!(stdout)?;
        writeln!(stdout, "{RULE}")?;
        writeln!(stdout, "                    COMMAND HISTORY")?;
        writeln!(stdout, "{RULE}")?;
        for (i, entry) in ctx.history.iter().enumerate() {
            writeln!(stdout, "  {:3}. {}", i + 1, entry)?;
        }
        writeln!(stdout, "{RULE}")?;
        writeln!(stdout)?;
        Ok(SUCCESS)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the user's home directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    /// Only the environment changes here; the interpreter moves the process
    /// along when the command ran at the top level.
    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => ctx.env.home_dir()?,
        };

        let new_dir = ctx.env.resolve_path(&target);
        let canonical = fs::canonicalize(&new_dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => anyhow::Error::new(ShellError::PathNotFound(target.clone())),
            _ => anyhow::Error::new(e)
                .context(format!("can't canonicalize {}", new_dir.display())),
        })?;
        if !canonical.is_dir() {
            anyhow::bail!("{}: not a directory", target.display());
        }

        ctx.env.current_dir = canonical;
        Ok(SUCCESS)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        ctx: &mut Context<'_>,
    ) -> Result<ExitCode> {
        ctx.env.should_exit = true;
        Ok(SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env as stdenv;
    use std::io::Cursor;

    fn test_env(current_dir: PathBuf) -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir,
            should_exit: false,
        }
    }

    fn run<T: BuiltinCommand>(cmd: T, env: &mut Environment, history: &[String]) -> (Result<ExitCode>, String) {
        let mut out = Vec::new();
        let mut ctx = Context { env, history };
        let res = cmd.execute(&mut Cursor::new(Vec::new()), &mut out, &mut ctx);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_count_stats_simple_file() {
        let stats = FileStats::read_from(&b"a b\nc\n"[..]).unwrap();
        assert_eq!(stats, FileStats { lines: 2, words: 3, bytes: 6 });
    }

    #[test]
    fn test_count_stats_unterminated_last_line() {
        let stats = FileStats::read_from(&b"one two\nthree"[..]).unwrap();
        assert_eq!(stats, FileStats { lines: 2, words: 3, bytes: 13 });

        let stats = FileStats::read_from(&b""[..]).unwrap();
        assert_eq!(stats, FileStats::default());

        let stats = FileStats::read_from(&b"\t a\r\n\n"[..]).unwrap();
        assert_eq!(stats, FileStats { lines: 2, words: 1, bytes: 6 });
    }

    #[test]
    fn test_count_reads_file_relative_to_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.txt"), "a b\nc\n").unwrap();
        let mut env = test_env(dir.path().to_path_buf());

        let (res, out) = run(Count { file: "data.txt".into() }, &mut env, &[]);
        assert_eq!(res.unwrap(), SUCCESS);
        assert_eq!(
            out,
            "\nFile: data.txt\n  Lines:      2\n  Words:      3\n  Characters: 6\n\n"
        );
    }

    #[test]
    fn test_count_missing_file_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = test_env(dir.path().to_path_buf());

        let (res, out) = run(Count { file: "absent.txt".into() }, &mut env, &[]);
        let err = res.unwrap_err();
        assert!(matches!(err.downcast_ref::<ShellError>(), Some(ShellError::FileNotFound(_))));
        assert!(out.is_empty());
    }

    #[test]
    fn test_count_without_argument_fails_with_usage() {
        let env = test_env(stdenv::temp_dir());
        let cmd = Factory::<Count>::default()
            .try_create(&env, "count", &[])
            .expect("count is a builtin");
        let mut env = env;
        let mut ctx = Context { env: &mut env, history: &[] };
        let code = cmd
            .execute(Box::new(crate::io_adapters::MemReader::empty()), Box::new(tempfile::tempfile().unwrap()), &mut ctx)
            .unwrap();
        assert_eq!(code, FAILURE);
    }

    #[test]
    fn test_clear_emits_clear_sequence() {
        let mut env = test_env(stdenv::temp_dir());
        let (res, out) = run(Clear {}, &mut env, &[]);
        assert_eq!(res.unwrap(), SUCCESS);
        assert_eq!(out, "\x1b[2J\x1b[H");
    }

    /// Accepts every write but cannot deliver it.
    struct UnflushableOutput;

    impl Write for UnflushableOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"))
        }
    }

    impl From<UnflushableOutput> for std::process::Stdio {
        fn from(_: UnflushableOutput) -> Self {
            std::process::Stdio::null()
        }
    }

    #[test]
    fn test_failed_flush_is_a_builtin_failure() {
        let mut env = test_env(stdenv::temp_dir());
        let cmd = Factory::<Clear>::default()
            .try_create(&env, "clear", &[])
            .expect("clear is a builtin");
        let mut ctx = Context { env: &mut env, history: &[] };
        let code = cmd
            .execute(Box::new(crate::io_adapters::MemReader::empty()), Box::new(UnflushableOutput), &mut ctx)
            .unwrap();
        assert_eq!(code, FAILURE);
    }

    #[test]
    fn test_help_and_about_list_builtins() {
        let mut env = test_env(stdenv::temp_dir());
        let (res, out) = run(Help {}, &mut env, &[]);
        assert_eq!(res.unwrap(), SUCCESS);
        for name in ["about", "help", "clear", "cd", "count", "history", "exit"] {
            assert!(out.contains(name), "help does not mention {name}");
        }

        let (res, out) = run(About {}, &mut env, &[]);
        assert_eq!(res.unwrap(), SUCCESS);
        assert!(out.contains("terminal_shell"));
    }

    #[test]
    fn test_history_lists_entries_one_indexed() {
        let mut env = test_env(stdenv::temp_dir());
        let history = vec!["echo one".to_string(), "ls -l".to_string()];
        let (res, out) = run(History {}, &mut env, &history);
        assert_eq!(res.unwrap(), SUCCESS);
        assert!(out.contains("    1. echo one\n"));
        assert!(out.contains("    2. ls -l\n"));
        assert!(out.find("echo one").unwrap() < out.find("ls -l").unwrap());
    }

    #[test]
    fn test_history_when_empty() {
        let mut env = test_env(stdenv::temp_dir());
        let (res, out) = run(History {}, &mut env, &[]);
        assert_eq!(res.unwrap(), SUCCESS);
        assert_eq!(out, "\nNo command history yet.\n\n");
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let mut env = test_env(stdenv::temp_dir());

        let target = Some(canonical_temp.to_string_lossy().to_string());
        let (res, _) = run(Cd { target }, &mut env, &[]);

        assert_eq!(res.unwrap(), SUCCESS);
        assert_eq!(env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_relative_to_current_dir() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        let mut env = test_env(temp.path().to_path_buf());

        let (res, _) = run(Cd { target: Some("sub".into()) }, &mut env, &[]);

        assert_eq!(res.unwrap(), SUCCESS);
        assert_eq!(env.current_dir, fs::canonicalize(temp.path().join("sub")).unwrap());
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let mut env = test_env(stdenv::temp_dir());
        env.set_var("HOME", canonical_temp.to_string_lossy().to_string());

        let (res, _) = run(Cd { target: None }, &mut env, &[]);

        assert_eq!(res.unwrap(), SUCCESS);
        assert_eq!(env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let temp = tempfile::tempdir().unwrap();
        let orig = temp.path().to_path_buf();
        let mut env = test_env(orig.clone());

        let (res, _) = run(Cd { target: Some("nonexistent_dir".into()) }, &mut env, &[]);

        let err = res.unwrap_err();
        assert!(matches!(err.downcast_ref::<ShellError>(), Some(ShellError::PathNotFound(_))));
        assert_eq!(env.current_dir, orig);
    }

    #[test]
    fn test_cd_to_file_errors() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("plain.txt"), "x").unwrap();
        let mut env = test_env(temp.path().to_path_buf());

        let (res, _) = run(Cd { target: Some("plain.txt".into()) }, &mut env, &[]);
        assert!(res.is_err());
        assert_eq!(env.current_dir, temp.path());
    }

    #[test]
    fn test_exit_sets_flag_and_succeeds() {
        let mut env = test_env(stdenv::temp_dir());
        let (res, _) = run(Exit { _args: vec!["3".into()] }, &mut env, &[]);
        assert_eq!(res.unwrap(), SUCCESS);
        assert!(env.should_exit);
    }

    #[test]
    fn test_factories_know_every_builtin() {
        let names: Vec<_> = builtin_factories()
            .iter()
            .filter_map(|f| f.builtin_name())
            .collect();
        assert_eq!(names, ["about", "help", "clear", "count", "history", "cd", "exit"]);
    }
}
