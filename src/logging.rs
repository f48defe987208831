use color_eyre::{
    eyre::WrapErr,
    Result,
};
use std::{
    fs::File,
    path::Path,
    sync::Mutex,
};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt,
    prelude::*,
    EnvFilter,
};

/// Human readable output on stderr, filtered by `RUST_LOG` (default `info`,
/// `debug` when verbose). With a log file, everything down to `debug` is
/// written there as well, including the output of every worker.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let stderr_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path).wrap_err_with(|| format!("unable to create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(stderr_filter))
        .with(file_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .wrap_err("failed to initialize tracing subscriber")?;
    Ok(())
}
