use crate::command::{ExitCode, SUCCESS};
use std::path::PathBuf;

/// Name of the history file in the user's home directory.
pub const HISTORY_FILE_NAME: &str = ".terminal_history";

/// How the status of a multi-stage pipeline is derived from its stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Status of the last stage, whatever happened upstream.
    #[default]
    Last,
    /// Status of the rightmost failing stage, 0 if every stage succeeded.
    PipeFail,
}

impl PipelineStatus {
    pub fn reduce(self, statuses: &[ExitCode]) -> ExitCode {
        match self {
            PipelineStatus::Last => statuses.last().copied().unwrap_or(SUCCESS),
            PipelineStatus::PipeFail => statuses
                .iter()
                .rev()
                .copied()
                .find(|&code| code != SUCCESS)
                .unwrap_or(SUCCESS),
        }
    }
}

/// Interpreter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub pipeline_status: PipelineStatus,
    /// Inject `--color=auto` into a top-level `ls`.
    pub colorize_ls: bool,
    /// Append-only history file; history stays in memory when `None`.
    pub history_file: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            pipeline_status: PipelineStatus::Last,
            colorize_ls: true,
            history_file: None,
        }
    }
}

/// `~/.terminal_history`, if the home directory is known.
pub fn default_history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(HISTORY_FILE_NAME))
}
