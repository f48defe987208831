use super::{
    parse_output,
    Job,
    JobContext,
    WorkerInit,
};
use crate::{
    output::{
        Diagnostics,
        WorkerOutput,
    },
    Error,
    Result,
};
use netbench_config::ParserKind;
use netbench_resultset::{
    epoch_seconds,
    Metadata,
};
use std::{
    process::{
        ExitStatus,
        Stdio,
    },
    time::Duration,
};
use tokio::{
    io::{
        AsyncRead,
        AsyncReadExt,
    },
    process::{
        Child,
        Command,
    },
    time::sleep,
};

/// How long each termination signal gets before escalating.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);
const TERMINATE_POLL: Duration = Duration::from_millis(100);

/// Runs one external command and parses its stdout.
#[derive(Debug, Clone)]
pub struct ProcessJob {
    name: String,
    argv: Vec<String>,
    invocation: String,
    parser: ParserKind,
    metadata: Metadata,
}

impl ProcessJob {
    pub fn from_init(init: &WorkerInit) -> Result<Self> {
        let spec = &init.spec;
        let command = spec
            .command
            .as_deref()
            .filter(|command| !command.trim().is_empty())
            .ok_or_else(|| Error::Configuration(format!("worker '{}' has no command", spec.name)))?;

        let argv = match &spec.remote_host {
            Some(host) => vec!["ssh".to_string(), host.clone(), command.to_string()],
            None => shlex::split(command).filter(|argv| !argv.is_empty()).ok_or_else(|| {
                Error::Configuration(format!(
                    "worker '{}' has an unparsable command: {command}",
                    spec.name
                ))
            })?,
        };
        let invocation = argv
            .iter()
            .map(|arg| shlex::try_quote(arg).map_or_else(|_| arg.clone(), |quoted| quoted.into_owned()))
            .collect::<Vec<_>>()
            .join(" ");

        let mut metadata = Metadata::new();
        metadata.set("RUNNER", spec.kind.clone());
        metadata.set("IDX", spec.idx);
        metadata.set("COMMAND", invocation.clone());
        metadata.set("UNITS", spec.units.clone());
        metadata.set("REMOTE_HOST", spec.remote_host.clone());

        Ok(Self {
            name: spec.name.clone(),
            argv,
            invocation,
            parser: spec.parser,
            metadata,
        })
    }

    fn failed(&self, diagnostics: Diagnostics) -> WorkerOutput {
        WorkerOutput {
            metadata: self.metadata.clone(),
            diagnostics,
            ..WorkerOutput::empty()
        }
    }
}

impl Job for ProcessJob {
    fn describe(&self) -> String {
        self.invocation.clone()
    }

    async fn run(self, ctx: JobContext) -> WorkerOutput {
        let mut diagnostics = Diagnostics {
            command: Some(self.invocation.clone()),
            ..Diagnostics::default()
        };

        let program = match which::which(&self.argv[0]) {
            Ok(program) => program,
            Err(err) => {
                warn!(worker = %self.name, "{} not found: {err}", self.argv[0]);
                return self.failed(diagnostics);
            }
        };

        let mut child = match Command::new(program)
            .args(&self.argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!(worker = %self.name, "unable to spawn '{}': {err}", self.invocation);
                return self.failed(diagnostics);
            }
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, stdout, stderr) =
            tokio::join!(wait_or_stop(&mut child, &ctx), read_all(stdout), read_all(stderr));
        diagnostics.stdout = stdout;
        diagnostics.stderr = stderr;

        let status = match status {
            Ok(status) => status,
            Err(err) => {
                warn!(worker = %self.name, "unable to wait for '{}': {err}", self.invocation);
                return self.failed(diagnostics);
            }
        };
        diagnostics.exit_status = status.code();

        let stopped = ctx.stop.is_cancelled();
        if !status.success() && !stopped {
            warn!(
                worker = %self.name,
                "program exited non-zero ({status}), command: {}",
                self.invocation
            );
            return self.failed(diagnostics);
        }

        let now = epoch_seconds(&chrono::Utc::now());
        let parsed = parse_output(self.parser, &diagnostics.stdout, now);
        let silent = self.parser == ParserKind::Silent;
        if parsed.result.is_empty() && !silent {
            warn!(worker = %self.name, "command produced no valid data: {}", self.invocation);
        }

        let mut metadata = self.metadata;
        for (key, value) in parsed.metadata.into_inner() {
            metadata.set(key, value);
        }
        WorkerOutput {
            result: parsed.result,
            raw_values: parsed.raw,
            metadata,
            diagnostics,
            silent,
        }
    }
}

async fn wait_or_stop(child: &mut Child, ctx: &JobContext) -> std::io::Result<ExitStatus> {
    tokio::select! {
        biased;
        status = child.wait() => status,
        _ = ctx.stop.cancelled() => terminate(child).await,
    }
}

/// Ask the process to exit with SIGINT, then SIGTERM, and finally kill it.
async fn terminate(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) {
        for signal in [libc::SIGINT, libc::SIGTERM] {
            // SAFETY: pid belongs to a child we have not reaped yet.
            unsafe {
                libc::kill(pid, signal);
            }
            let mut waited = Duration::ZERO;
            while waited < TERMINATE_GRACE {
                sleep(TERMINATE_POLL).await;
                waited += TERMINATE_POLL;
                if let Some(status) = child.try_wait()? {
                    return Ok(status);
                }
            }
            debug!(pid, signal, "process ignored signal, escalating");
        }
    }
    child.kill().await?;
    child.wait().await
}

async fn read_all(stream: Option<impl AsyncRead + Unpin>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(err) = stream.read_to_end(&mut buf).await {
        debug!("unable to read process output: {err}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
