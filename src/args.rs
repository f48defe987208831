use clap::{
    Parser,
    Subcommand,
};
use netbench_config::RunArgs;
use std::path::PathBuf;

/// Run network measurement tools concurrently and collect their output
/// into one aligned result set.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log debug output to stderr.
    #[clap(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a test. Send SIGUSR1 to stop all workers gracefully and keep what
    /// they produced so far; Ctrl-C aborts the run.
    Run(RunArgs),

    /// Print a summary of a result file.
    Show {
        #[clap(value_name = "FILE")]
        file: PathBuf,
    },
}

impl Cli {
    pub fn log_file(&self) -> Option<&PathBuf> {
        match &self.command {
            Command::Run(args) => args.log_file.as_ref(),
            Command::Show { .. } => None,
        }
    }
}
