//! Splitting of a raw command line into chain links, pipeline stages and
//! redirections.
//!
//! Precedence, loosest first: `&&` separates chain links, `|` separates the
//! stages of one link, whitespace separates the words of one stage. There is
//! no quoting, so operators are recognized wherever they appear in the text,
//! except for `<` and `>` which only count as stand-alone words.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Chain operator.
pub const AND_OPERATOR: &str = "&&";

/// Pipeline operator.
pub const PIPE_OPERATOR: char = '|';

/// Argument injected into a top-level `ls` invocation.
pub const LS_COLOR_FLAG: &str = "--color=auto";

/// Direction of a redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// `<`: read standard input from a file.
    Input,
    /// `>`: write standard output to a file, truncating it.
    Output,
}

impl Redirect {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(Redirect::Input),
            ">" => Some(Redirect::Output),
            _ => None,
        }
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Redirect::Input => f.write_str("<"),
            Redirect::Output => f.write_str(">"),
        }
    }
}

/// Errors that can occur while splitting a line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A redirection operator ends the stage.
    #[error("missing file name after '{0}'")]
    MissingRedirectTarget(Redirect),
    /// A redirection operator is directly followed by another one.
    #[error("unexpected '{found}' after '{after}'")]
    UnexpectedRedirect { after: Redirect, found: Redirect },
}

/// One executable unit: a program, its arguments and its redirections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    /// Program name; empty for a no-op stage.
    pub program: String,
    pub args: Vec<String>,
    /// File bound to standard input.
    pub input: Option<PathBuf>,
    /// File bound to standard output, created or truncated.
    pub output: Option<PathBuf>,
}

impl Stage {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    /// A stage without a program succeeds without running anything.
    pub fn is_noop(&self) -> bool {
        self.program.is_empty()
    }
}

/// The stages of one chain link, in data-flow order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    /// Source text of the link, as recorded in history.
    pub text: String,
    pub stages: Vec<Stage>,
}

/// A parsed command line: pipelines joined by `&&`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub links: Vec<Pipeline>,
}

impl CommandLine {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Inject [`LS_COLOR_FLAG`] into `ls` when it is the only thing on the line.
    ///
    /// Chained or piped `ls` invocations are left alone so their output stays
    /// free of escape codes.
    pub fn colorize_ls(mut self) -> Self {
        if let [link] = self.links.as_mut_slice() {
            if let [stage] = link.stages.as_mut_slice() {
                if stage.program == "ls" {
                    stage.args.insert(0, LS_COLOR_FLAG.to_string());
                }
            }
        }
        self
    }
}

/// Split a line into its `&&` links, trimmed, with empty links dropped.
pub fn split_chain(line: &str) -> Vec<&str> {
    line.split(AND_OPERATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Split one chain link into its stage strings, trimmed.
///
/// Empty stages are kept; they become no-op stages.
pub fn split_pipeline(command: &str) -> Vec<&str> {
    command.split(PIPE_OPERATOR).map(str::trim).collect()
}

struct StageBuilder<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> StageBuilder<'a> {
    fn from(text: &'a str) -> Self {
        StageBuilder {
            tokens: text.split_whitespace().collect(),
            pos: 0,
        }
    }

    fn consume(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn build(mut self) -> Result<Stage, ParseError> {
        let mut stage = Stage::default();
        let mut words = Vec::new();

        while let Some(token) = self.consume() {
            match Redirect::from_token(token) {
                Some(redirect) => {
                    let target = self.parse_redirect_target(redirect)?;
                    match redirect {
                        Redirect::Input => stage.input = Some(target),
                        Redirect::Output => stage.output = Some(target),
                    }
                }
                None => words.push(token.to_string()),
            }
        }

        let mut words = words.into_iter();
        if let Some(program) = words.next() {
            stage.program = program;
            stage.args = words.collect();
        }
        Ok(stage)
    }

    /// Parse the file name following a redirection operator.
    fn parse_redirect_target(&mut self, redirect: Redirect) -> Result<PathBuf, ParseError> {
        match self.consume() {
            None => Err(ParseError::MissingRedirectTarget(redirect)),
            Some(token) => match Redirect::from_token(token) {
                Some(found) => Err(ParseError::UnexpectedRedirect {
                    after: redirect,
                    found,
                }),
                None => Ok(PathBuf::from(token)),
            },
        }
    }
}

/// Parse one stage string into a [`Stage`].
pub fn parse_stage(text: &str) -> Result<Stage, ParseError> {
    StageBuilder::from(text).build()
}

/// Parse one chain link into a [`Pipeline`].
pub fn parse_pipeline(command: &str) -> Result<Pipeline, ParseError> {
    let stages = split_pipeline(command)
        .into_iter()
        .map(parse_stage)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Pipeline {
        text: command.to_string(),
        stages,
    })
}

/// Parse a whole command line.
///
/// Parsing is eager: an error in any link rejects the whole line.
pub fn parse_line(line: &str) -> Result<CommandLine, ParseError> {
    let links = split_chain(line)
        .into_iter()
        .map(parse_pipeline)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CommandLine { links })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn programs(line: &CommandLine) -> Vec<Vec<&str>> {
        line.links
            .iter()
            .map(|link| link.stages.iter().map(|s| s.program.as_str()).collect())
            .collect()
    }

    /// Splits the first `&&` off and recurses on the rest of the text.
    fn split_chain_recursive(line: &str) -> Vec<String> {
        match line.split_once(AND_OPERATOR) {
            None => {
                let part = line.trim();
                if part.is_empty() { vec![] } else { vec![part.to_string()] }
            }
            Some((head, rest)) => {
                let mut parts = split_chain_recursive(head);
                parts.extend(split_chain_recursive(rest));
                parts
            }
        }
    }

    #[test]
    fn test_split_chain_trims_and_drops_empty_links() {
        assert_eq!(
            split_chain("  echo a &&echo b&&   && ls -l  "),
            vec!["echo a", "echo b", "ls -l"]
        );
        assert!(split_chain("   ").is_empty());
        assert!(split_chain("&&").is_empty());
    }

    #[test]
    fn test_single_ampersand_is_not_an_operator() {
        assert_eq!(split_chain("echo a & b"), vec!["echo a & b"]);
    }

    #[test]
    fn test_flat_split_matches_recursive_split() {
        let lines = [
            "a && b && c",
            "a&&b",
            "&& a &&& b",
            "echo x | cat && wc -l < f && ",
            "no operators here",
            "",
        ];
        for line in lines {
            let flat: Vec<String> = split_chain(line).into_iter().map(String::from).collect();
            assert_eq!(flat, split_chain_recursive(line), "line: {line:?}");
        }
    }

    #[test]
    fn test_split_pipeline_keeps_empty_stages() {
        assert_eq!(split_pipeline("a | b|c"), vec!["a", "b", "c"]);
        assert_eq!(split_pipeline("a || b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_parse_stage_words() {
        let stage = parse_stage("  grep  -n   foo\tbar ").unwrap();
        assert_eq!(stage.program, "grep");
        assert_eq!(stage.args, vec!["-n", "foo", "bar"]);
        assert_eq!(stage.input, None);
        assert_eq!(stage.output, None);
    }

    #[test]
    fn test_parse_stage_removes_redirections() {
        let stage = parse_stage("sort < in.txt -r > out.txt").unwrap();
        assert_eq!(stage.program, "sort");
        assert_eq!(stage.args, vec!["-r"]);
        assert_eq!(stage.input, Some(PathBuf::from("in.txt")));
        assert_eq!(stage.output, Some(PathBuf::from("out.txt")));
    }

    #[test]
    fn test_parse_stage_last_redirection_wins() {
        let stage = parse_stage("echo hi > a > b").unwrap();
        assert_eq!(stage.output, Some(PathBuf::from("b")));
        assert_eq!(stage.args, vec!["hi"]);
    }

    #[test]
    fn test_attached_operator_is_a_plain_word() {
        let stage = parse_stage("echo a>b").unwrap();
        assert_eq!(stage.args, vec!["a>b"]);
        assert_eq!(stage.output, None);
    }

    #[test]
    fn test_missing_redirect_target_is_error() {
        assert_eq!(
            parse_stage("echo hi >"),
            Err(ParseError::MissingRedirectTarget(Redirect::Output))
        );
        assert_eq!(
            parse_stage("cat <"),
            Err(ParseError::MissingRedirectTarget(Redirect::Input))
        );
        assert_eq!(
            parse_stage("cat < > x"),
            Err(ParseError::UnexpectedRedirect {
                after: Redirect::Input,
                found: Redirect::Output
            })
        );
    }

    #[test]
    fn test_parse_error_in_any_link_rejects_line() {
        assert!(parse_line("echo ok && echo bad >").is_err());
        assert!(parse_line("echo ok | cat < && true").is_err());
    }

    #[test]
    fn test_empty_stage_is_noop() {
        let line = parse_line("echo a || cat").unwrap();
        assert_eq!(programs(&line), vec![vec!["echo", "", "cat"]]);
        assert!(line.links[0].stages[1].is_noop());
    }

    #[test]
    fn test_redirect_only_stage_keeps_target() {
        let stage = parse_stage("> created.txt").unwrap();
        assert!(stage.is_noop());
        assert_eq!(stage.output, Some(PathBuf::from("created.txt")));
    }

    #[test]
    fn test_parse_line_structure() {
        let line = parse_line("cd /tmp && ls | wc -l > n.txt && echo done").unwrap();
        assert_eq!(
            programs(&line),
            vec![vec!["cd"], vec!["ls", "wc"], vec!["echo"]]
        );
        assert_eq!(line.links[1].text, "ls | wc -l > n.txt");
        assert_eq!(line.links[1].stages[1].args, vec!["-l"]);
    }

    #[test]
    fn test_colorize_ls_top_level_only() {
        let top = parse_line("ls -l /tmp").unwrap().colorize_ls();
        assert_eq!(top.links[0].stages[0].args, vec![LS_COLOR_FLAG, "-l", "/tmp"]);

        let piped = parse_line("ls | cat").unwrap().colorize_ls();
        assert!(piped.links[0].stages[0].args.is_empty());

        let chained = parse_line("ls && ls").unwrap().colorize_ls();
        assert!(chained.links.iter().all(|l| l.stages[0].args.is_empty()));

        let other = parse_line("lsblk").unwrap().colorize_ls();
        assert!(other.links[0].stages[0].args.is_empty());
    }
}
