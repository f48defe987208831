//! Workers wrap exactly one measurement process or computation and expose
//! the same lifecycle to the supervisor.

use crate::{
    output::WorkerOutput,
    Signal,
};
use netbench_config::{
    RunConfig,
    WorkerSpec,
};
use std::{
    future::Future,
    sync::Arc,
};
use strum::Display;
use tokio_util::sync::CancellationToken;

mod computing;
mod null;
mod parser;
mod process;
mod task;

pub use computing::{
    expand_patterns,
    ComputeKind,
    ComputeKindIter,
    ComputingJob,
};
pub use null::NullJob;
pub use parser::{
    parse_output,
    ParsedOutput,
};
pub use process::ProcessJob;
pub use task::TaskWorker;

/// Uniform lifecycle of a worker as driven by the supervisor.
pub trait Worker: Send {
    fn name(&self) -> &str;

    /// Begin execution. Never blocks: waiting for the start signal happens
    /// inside the worker's own task.
    fn start(&mut self);

    fn is_running(&self) -> bool;

    /// Stop the worker. A graceful stop lets it flush partial output; a hard
    /// kill discards it. Calling this more than once is harmless.
    fn kill(&mut self, graceful: bool);

    /// Hand over the output once the worker is no longer running.
    fn take_output(&mut self) -> WorkerOutput;
}

/// Latches a worker is wired to.
#[derive(Debug, Clone, Default)]
pub struct WorkerSignals {
    /// Finish signal of the `run_after` dependency.
    pub start: Option<Signal>,
    /// Finish signal of the `kill_after` dependency.
    pub kill: Option<Signal>,
    /// Set by the worker in every terminal state.
    pub finish: Signal,
}

/// Everything a worker factory gets to build a worker from.
#[derive(Debug, Clone)]
pub struct WorkerInit {
    pub spec: WorkerSpec,
    pub config: Arc<RunConfig>,
    pub signals: WorkerSignals,
}

impl WorkerInit {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Created,
    Spawned,
    /// Waiting for the start signal.
    Blocked,
    Running,
    Finished,
    Killed,
    GracefullyStopped,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerState::Finished | WorkerState::Killed | WorkerState::GracefullyStopped
        )
    }
}

/// Handed to a job when it starts running.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Cancelled when the job should wrap up and return what it has.
    pub stop: CancellationToken,
}

/// The actual work of a [`TaskWorker`].
pub trait Job: Send + 'static {
    /// Label for logs, e.g. the command line.
    fn describe(&self) -> String;

    fn run(self, ctx: JobContext) -> impl Future<Output = WorkerOutput> + Send;
}
