use crate::args::{
    Cli,
    Command,
};
use color_eyre::{
    eyre::WrapErr,
    Result,
};
use netbench_config::{
    RunArgs,
    RunConfig,
};
use netbench_orchestrator::{
    run_test,
    Shutdown,
    WorkerRegistry,
};
use netbench_resultset::ResultSet;
use std::{
    fmt::Write as _,
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::{
    signal::unix::{
        signal,
        SignalKind,
    },
    task::JoinHandle,
};

pub struct App {
    cli: Cli,
}

impl App {
    pub fn new(cli: Cli) -> Result<Self> {
        Ok(Self { cli })
    }

    pub async fn run(self) -> Result<()> {
        match self.cli.command {
            Command::Run(args) => run(args).await,
            Command::Show { file } => show(&file),
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = Arc::new(RunConfig::load(&args)?);
    let shutdown = Shutdown::new();
    let signals = handle_signals(shutdown.clone())?;

    let result = run_test(config.clone(), WorkerRegistry::default(), shutdown).await;
    signals.abort();
    let rs = result?;

    std::fs::create_dir_all(&config.output_dir)
        .wrap_err_with(|| format!("unable to create output directory {}", config.output_dir.display()))?;
    let path = rs.dump_dir(&config.output_dir)?;
    info!("data file written to {}", path.display());
    Ok(())
}

/// SIGUSR1 stops all workers gracefully, Ctrl-C aborts the run.
fn handle_signals(shutdown: Shutdown) -> Result<JoinHandle<()>> {
    let mut usr1 = signal(SignalKind::user_defined1()).wrap_err("unable to listen for SIGUSR1")?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = usr1.recv() => {
                    let requests = shutdown.request_graceful();
                    info!(requests, "received SIGUSR1");
                },
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        error!("unable to listen for ctrl-c: {err}");
                        return;
                    }
                    warn!("received ctrl-c, aborting");
                    shutdown.abort();
                    return;
                },
            }
        }
    }))
}

fn show(file: &Path) -> Result<()> {
    let rs = ResultSet::load_file(file)?;
    print!("{}", summary(&rs));
    Ok(())
}

fn summary(rs: &ResultSet) -> String {
    let metadata = rs.metadata();
    let mut out = String::new();
    let _ = writeln!(out, "{}", rs.title());
    let _ = writeln!(out, "  tool version: {}", metadata.get_str("TOOL_VERSION").unwrap_or("unknown"));
    if let Some(length) = metadata.get_f64("TOTAL_LENGTH").and_then(|s| Duration::try_from_secs_f64(s).ok()) {
        let _ = writeln!(out, "  length:       {}", humantime::format_duration(length));
    }
    let _ = writeln!(out, "  points:       {}", rs.len());
    let _ = writeln!(out, "  series:       {}", rs.results().len());
    for (name, values) in rs.results() {
        let present = values.iter().flatten().count();
        let raw = rs.raw_values().get(name).map_or(0, Vec::len);
        let _ = writeln!(out, "    {name}: {present}/{} values, {raw} raw samples", values.len());
    }
    out
}
