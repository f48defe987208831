#![allow(dead_code)]

use indexmap::IndexMap;
use netbench_config::{
    AggregatorKind,
    RunConfig,
    WorkerSpec,
};
use netbench_orchestrator::{
    worker::Worker,
    Signal,
    WorkerOutput,
    WorkerRegistry,
    WorkerResult,
};
use std::{
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::time::sleep;

/// Test double that finishes as soon as it is started.
pub struct FixedWorker {
    pub name: String,
    pub output: Option<WorkerOutput>,
    pub finish: Signal,
}

impl Worker for FixedWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.finish.set();
    }

    fn is_running(&self) -> bool {
        false
    }

    fn kill(&mut self, _graceful: bool) {}

    fn take_output(&mut self) -> WorkerOutput {
        self.output.take().unwrap_or_default()
    }
}

/// Kill calls observed by [`StoppableWorker`]s: `(worker, graceful)`.
pub type KillLog = Arc<Mutex<Vec<(String, bool)>>>;

/// Test double that runs until it is stopped and records every kill call.
/// A graceful stop takes `linger` to complete.
pub struct StoppableWorker {
    pub name: String,
    pub started: bool,
    pub linger: Duration,
    pub finish: Signal,
    pub kills: KillLog,
}

impl Worker for StoppableWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.started = true;
    }

    fn is_running(&self) -> bool {
        self.started && !self.finish.is_set()
    }

    fn kill(&mut self, graceful: bool) {
        self.kills.lock().unwrap().push((self.name.clone(), graceful));
        if graceful && !self.linger.is_zero() {
            let finish = self.finish.clone();
            let linger = self.linger;
            tokio::spawn(async move {
                sleep(linger).await;
                finish.set();
            });
        } else {
            self.finish.set();
        }
    }

    fn take_output(&mut self) -> WorkerOutput {
        WorkerOutput::empty().with_result(WorkerResult::Series(vec![(10.0, 1.0), (11.0, 2.0)]))
    }
}

/// Parse `t:v,t:v` into samples.
pub fn samples(encoded: &str) -> Vec<(f64, f64)> {
    encoded
        .split(',')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (t, v) = pair.split_once(':').unwrap();
            (t.parse().unwrap(), v.parse().unwrap())
        })
        .collect()
}

/// The default registry plus the `series` and `empty` test doubles. A
/// `series` worker returns the samples encoded in its command.
pub fn registry() -> WorkerRegistry {
    let mut registry = WorkerRegistry::default();
    registry
        .register("series", |init| {
            let samples = samples(init.spec.command.as_deref().unwrap_or_default());
            let mut output = WorkerOutput::empty().with_result(WorkerResult::Series(samples.clone()));
            let mean = samples.iter().map(|(_, v)| v).sum::<f64>() / samples.len().max(1) as f64;
            output.metadata.set("MEAN_VALUE", mean);
            output.metadata.set("UNITS", "Mbits/s");
            Ok(Box::new(FixedWorker {
                name: init.spec.name.clone(),
                output: Some(output),
                finish: init.signals.finish,
            }) as Box<dyn Worker>)
        })
        .register("empty", |init| {
            Ok(Box::new(FixedWorker {
                name: init.spec.name.clone(),
                output: None,
                finish: init.signals.finish,
            }) as Box<dyn Worker>)
        });
    registry
}

pub fn series(name: &str, encoded: &str) -> (String, WorkerSpec) {
    let mut spec = WorkerSpec::new(name, "series");
    spec.command = Some(encoded.to_string());
    (name.to_string(), spec)
}

pub fn config(aggregator: AggregatorKind, step_size: f64, workers: Vec<(String, WorkerSpec)>) -> Arc<RunConfig> {
    let config = RunConfig {
        name: "test".to_string(),
        step_size,
        aggregator,
        workers: workers.into_iter().collect::<IndexMap<_, _>>(),
        ..RunConfig::default()
    };
    Arc::new(config.finalize().unwrap())
}
