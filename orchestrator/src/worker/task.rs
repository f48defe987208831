use super::{
    Job,
    JobContext,
    Worker,
    WorkerInit,
    WorkerSignals,
    WorkerState,
};
use crate::{
    output::WorkerOutput,
    Signal,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        oneshot,
        watch,
    },
    task::JoinHandle,
    time::sleep,
};
use tokio_util::sync::CancellationToken;

/// Runs a [`Job`] on its own tokio task and handles the signal wiring,
/// delay, watchdog and stop requests around it.
#[derive(Debug)]
pub struct TaskWorker<J> {
    name: String,
    job: Option<J>,
    signals: WorkerSignals,
    delay: Duration,
    kill_timeout: Option<Duration>,
    stop: CancellationToken,
    state: Arc<watch::Sender<WorkerState>>,
    outcome: Option<oneshot::Receiver<WorkerOutput>>,
    handle: Option<JoinHandle<()>>,
    killed: bool,
}

impl<J: Job> TaskWorker<J> {
    pub fn new(init: &WorkerInit, job: J) -> Self {
        let (state, _) = watch::channel(WorkerState::Created);
        Self {
            name: init.spec.name.clone(),
            job: Some(job),
            signals: init.signals.clone(),
            delay: init.spec.delay(),
            kill_timeout: init.spec.kill_timeout(),
            stop: CancellationToken::new(),
            state: Arc::new(state),
            outcome: None,
            handle: None,
            killed: false,
        }
    }

    pub fn state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn spawn(&mut self, job: J) {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let name = self.name.clone();
        let signals = self.signals.clone();
        let delay = self.delay;
        let kill_timeout = self.kill_timeout;
        let stop = self.stop.clone();
        let state = self.state.clone();

        self.outcome = Some(outcome_rx);
        self.handle = Some(tokio::spawn(async move {
            let _finish = signals.finish.set_on_drop();
            state.send_replace(WorkerState::Spawned);

            if let Some(start) = &signals.start {
                state.send_replace(WorkerState::Blocked);
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        debug!(worker = %name, "stopped before the start signal");
                        state.send_replace(WorkerState::GracefullyStopped);
                        let _ = outcome_tx.send(WorkerOutput::empty());
                        return;
                    },
                    _ = start.wait() => {},
                }
            }

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        state.send_replace(WorkerState::GracefullyStopped);
                        let _ = outcome_tx.send(WorkerOutput::empty());
                        return;
                    },
                    _ = sleep(delay) => {},
                }
            }

            state.send_replace(WorkerState::Running);
            debug!(worker = %name, job = %job.describe(), "running");

            let run = job.run(JobContext { stop: stop.clone() });
            tokio::pin!(run);
            let output = tokio::select! {
                output = &mut run => output,
                reason = watchdog(signals.kill.clone(), kill_timeout) => {
                    info!(worker = %name, "{reason}, stopping");
                    stop.cancel();
                    run.await
                },
            };

            state.send_replace(if stop.is_cancelled() {
                WorkerState::GracefullyStopped
            } else {
                WorkerState::Finished
            });
            let _ = outcome_tx.send(output);
        }));
    }
}

/// Resolves when the worker should stop on its own: its `kill_after`
/// dependency finished or it ran into its `kill_timeout`.
async fn watchdog(kill: Option<Signal>, timeout: Option<Duration>) -> String {
    let kill = async {
        match &kill {
            Some(signal) => signal.wait().await,
            None => std::future::pending().await,
        }
    };
    let timeout_elapsed = async {
        match timeout {
            Some(timeout) => sleep(timeout).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = kill => "kill signal received".to_string(),
        _ = timeout_elapsed => format!(
            "still running after {}",
            humantime::format_duration(timeout.unwrap_or_default())
        ),
    }
}

impl<J: Job> Worker for TaskWorker<J> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        match self.job.take() {
            Some(job) => self.spawn(job),
            None => warn!(worker = %self.name, "worker was already started"),
        }
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn kill(&mut self, graceful: bool) {
        if graceful {
            if !self.stop.is_cancelled() {
                debug!(worker = %self.name, "graceful stop requested");
            }
            self.stop.cancel();
            return;
        }
        if self.killed {
            return;
        }
        self.killed = true;
        self.stop.cancel();
        match self.handle.as_ref() {
            Some(handle) if !handle.is_finished() => {
                debug!(worker = %self.name, "killing");
                handle.abort();
                self.state.send_replace(WorkerState::Killed);
            }
            // Never started; nobody else will set the finish signal.
            None => {
                self.job = None;
                self.signals.finish.set();
                self.state.send_replace(WorkerState::Killed);
            }
            Some(_) => {}
        }
    }

    fn take_output(&mut self) -> WorkerOutput {
        if self.killed && *self.state.borrow() == WorkerState::Killed {
            return WorkerOutput::empty();
        }
        match self.outcome.take().map(|mut outcome| outcome.try_recv()) {
            Some(Ok(output)) => output,
            Some(Err(err)) => {
                warn!(worker = %self.name, "no output available: {err}");
                WorkerOutput::empty()
            }
            None => WorkerOutput::empty(),
        }
    }
}
