use argh::FromArgs;
use std::path::PathBuf;
use terminal_shell::Interpreter;
use terminal_shell::config::{PipelineStatus, ShellConfig, default_history_path};

#[derive(FromArgs)]
/// A line-oriented command shell.
struct Args {
    #[argh(option, short = 'c')]
    /// run one command line and exit with its status.
    command: Option<String>,

    #[argh(switch)]
    /// report the rightmost failing stage of a pipeline instead of the last one.
    pipefail: bool,

    #[argh(option)]
    /// append history to this file instead of ~/.terminal_history.
    history_file: Option<PathBuf>,

    #[argh(switch)]
    /// keep history in memory only.
    no_history_file: bool,

    #[argh(switch)]
    /// do not add --color=auto to ls.
    no_color: bool,
}

impl Args {
    fn config(&self) -> ShellConfig {
        let history_file = if self.no_history_file {
            None
        } else {
            self.history_file.clone().or_else(default_history_path)
        };
        ShellConfig {
            pipeline_status: if self.pipefail {
                PipelineStatus::PipeFail
            } else {
                PipelineStatus::Last
            },
            colorize_ls: !self.no_color,
            history_file,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Args = argh::from_env();
    let config = args.config();
    log::debug!("starting with {config:?}");
    let mut sh = Interpreter::from_config(config);

    if let Some(line) = &args.command {
        let code = sh.run_line(line);
        std::process::exit(code);
    }

    println!("Welcome to terminal_shell! Type 'help' for a list of commands.");
    sh.repl()?;
    println!("Goodbye!");
    Ok(())
}
