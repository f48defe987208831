use crate::{
    output::{
        Measurement,
        Postprocessor,
        WorkerOutput,
        WorkerResult,
    },
    registry::WorkerRegistry,
    transform::TransformChain,
    worker::{
        Worker,
        WorkerInit,
        WorkerSignals,
    },
    Error,
    Result,
    Shutdown,
    Signal,
};
use indexmap::IndexMap;
use netbench_config::{
    find_run_after_cycle,
    RunConfig,
    WorkerSpec,
    DUPLICATE_SEPARATOR,
};
use netbench_resultset::RawSample;
use serde_json::{
    Map,
    Value,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::time::sleep;

/// How often finished workers are checked for.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Everything one round of workers produced, keyed by series name.
#[derive(Debug, Default)]
pub struct Collected {
    pub results: IndexMap<String, Measurement>,
    /// Becomes `SERIES_META` of the result set.
    pub series_meta: Map<String, Value>,
    pub raw_values: IndexMap<String, Vec<RawSample>>,
    pub postprocessors: Vec<Postprocessor>,
    /// Workers that were expected to produce data and did not.
    pub failed_workers: usize,
    /// A graceful shutdown was requested while collecting.
    pub stopped: bool,
}

/// Runs one set of workers to completion and merges their output.
#[derive(Debug, Clone)]
pub struct Supervisor {
    registry: WorkerRegistry,
    config: Arc<RunConfig>,
    shutdown: Shutdown,
}

/// Hard-kills whatever is still running when dropped, so no worker outlives
/// the collect call that started it.
struct RunningWorkers(Vec<Box<dyn Worker>>);

impl Drop for RunningWorkers {
    fn drop(&mut self) {
        for worker in self.0.iter_mut().filter(|worker| worker.is_running()) {
            debug!(worker = %worker.name(), "killing leftover worker");
            worker.kill(false);
        }
    }
}

impl Supervisor {
    pub fn new(registry: WorkerRegistry, config: Arc<RunConfig>, shutdown: Shutdown) -> Self {
        Self {
            registry,
            config,
            shutdown,
        }
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Start one worker per spec, wait for all of them and merge what they
    /// produced. Series lengths are left alone.
    #[instrument(level = "debug", skip_all, fields(workers = specs.len()))]
    pub async fn collect(&self, specs: &IndexMap<String, WorkerSpec>) -> Result<Collected> {
        let finish: IndexMap<&str, Signal> = specs.keys().map(|name| (name.as_str(), Signal::new())).collect();
        let dependency = |spec: &WorkerSpec, field: &str, target: &Option<String>| -> Result<Option<Signal>> {
            let Some(target) = target else {
                return Ok(None);
            };
            finish.get(target.as_str()).cloned().map(Some).ok_or_else(|| {
                Error::Configuration(format!(
                    "worker '{}' refers to unknown worker '{target}' in {field}",
                    spec.name
                ))
            })
        };

        if let Some(cycle) = find_run_after_cycle(specs) {
            return Err(Error::Configuration(format!(
                "workers wait for each other in a loop: {}",
                cycle.join(" -> ")
            )));
        }

        let mut inits = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            let signals = WorkerSignals {
                start: dependency(spec, "run_after", &spec.run_after)?,
                kill: dependency(spec, "kill_after", &spec.kill_after)?,
                finish: finish[name.as_str()].clone(),
            };
            let mut spec = spec.clone();
            spec.name.clone_from(name);
            inits.push(WorkerInit {
                spec,
                config: self.config.clone(),
                signals,
            });
        }

        let mut workers = RunningWorkers(Vec::with_capacity(inits.len()));
        for init in inits {
            workers.0.push(self.registry.build(init)?);
        }
        for worker in workers.0.iter_mut() {
            worker.start();
        }

        let stopped = self.wait(&mut workers).await?;
        let mut collected = Collected {
            stopped,
            ..Collected::default()
        };
        // Workers were built in the order of `specs`.
        for (worker, (name, spec)) in workers.0.iter_mut().zip(specs) {
            let output = worker.take_output();
            merge(&mut collected, name, spec, output)?;
        }
        Ok(collected)
    }

    /// Poll until every worker is done. Returns whether a graceful shutdown
    /// was initiated on the way.
    async fn wait(&self, workers: &mut RunningWorkers) -> Result<bool> {
        let mut seen = 0;
        let mut stopping = false;
        while workers.0.iter().any(|worker| worker.is_running()) {
            tokio::select! {
                biased;
                _ = self.shutdown.aborted() => {
                    warn!("interrupted, killing all workers");
                    for worker in workers.0.iter_mut() {
                        worker.kill(false);
                    }
                    return Err(Error::Interrupted);
                },
                requests = self.shutdown.next_request(seen) => {
                    seen = requests;
                    if stopping {
                        info!("graceful shutdown already in progress");
                        continue;
                    }
                    info!("initiating graceful shutdown");
                    stopping = true;
                    for worker in workers.0.iter_mut().filter(|worker| worker.is_running()) {
                        worker.kill(true);
                    }
                },
                _ = sleep(POLL_INTERVAL) => {},
            }
        }
        if self.shutdown.is_aborted() {
            return Err(Error::Interrupted);
        }
        Ok(stopping)
    }
}

fn merge(collected: &mut Collected, name: &str, spec: &WorkerSpec, mut output: WorkerOutput) -> Result<()> {
    let diagnostics = &output.diagnostics;
    debug!(
        worker = name,
        command = diagnostics.command.as_deref().unwrap_or(spec.kind.as_str()),
        exit_status = ?diagnostics.exit_status,
        stdout = %diagnostics.stdout,
        stderr = %diagnostics.stderr,
        "worker done"
    );

    if output.is_failure() {
        warn!(worker = name, "worker produced no data");
        collected.failed_workers += 1;
    }

    let chain = TransformChain(&spec.data_transform);
    if !chain.is_empty() {
        chain.metadata(&spec.transformable, &mut output.metadata);
        chain.raw_values(name, &mut output.raw_values);
        output.metadata.set("DATA_TRANSFORM", chain.describe());
    }

    let merged: Vec<(String, Measurement)> = match output.result {
        WorkerResult::Empty => {
            collected
                .series_meta
                .insert(name.to_string(), Value::Object(output.metadata.into_inner()));
            collected.raw_values.insert(name.to_string(), output.raw_values);
            return Ok(());
        }
        WorkerResult::Scalar(value) => vec![(name.to_string(), Measurement::Scalar(Some(value)))],
        WorkerResult::Series(samples) => vec![(name.to_string(), Measurement::Series(samples))],
        WorkerResult::Named(values) => values
            .into_iter()
            .map(|(key, value)| (format!("{name}{DUPLICATE_SEPARATOR}{key}"), value))
            .collect(),
        WorkerResult::Deferred(postprocessor) => {
            collected.postprocessors.push(postprocessor);
            return Ok(());
        }
    };

    let metadata = Value::Object(output.metadata.into_inner());
    for (series, mut measurement) in merged {
        chain.measurement(&series, &mut measurement)?;
        collected.series_meta.insert(series.clone(), metadata.clone());
        collected.raw_values.insert(series.clone(), output.raw_values.clone());
        collected.results.insert(series, measurement);
    }
    Ok(())
}
