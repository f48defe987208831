use clap::Parser;
use color_eyre::Result;
use netbench::{
    init_errors,
    init_logging,
    App,
    Cli,
};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_errors()?;
    init_logging(cli.verbose, cli.log_file().map(PathBuf::as_path))?;
    App::new(cli)?.run().await
}
