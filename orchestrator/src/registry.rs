use crate::{
    worker::{
        ComputeKind,
        ComputingJob,
        NullJob,
        ProcessJob,
        TaskWorker,
        Worker,
        WorkerInit,
    },
    Error,
    Result,
};
use indexmap::IndexMap;
use netbench_config::DEFAULT_KIND;
use std::{
    fmt,
    sync::Arc,
};
use strum::IntoEnumIterator;

pub type WorkerFactory = Arc<dyn Fn(WorkerInit) -> Result<Box<dyn Worker>> + Send + Sync>;

/// Maps the `kind` of a worker spec to the code that builds it.
#[derive(Clone)]
pub struct WorkerRegistry {
    factories: IndexMap<String, WorkerFactory>,
}

impl WorkerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(WorkerInit) -> Result<Box<dyn Worker>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn build(&self, init: WorkerInit) -> Result<Box<dyn Worker>> {
        let factory = self.factories.get(&init.spec.kind).ok_or_else(|| {
            Error::Configuration(format!(
                "unknown kind '{}' for worker '{}', known kinds: {}",
                init.spec.kind,
                init.name(),
                self.kinds().collect::<Vec<_>>().join(", ")
            ))
        })?;
        factory(init)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(DEFAULT_KIND, |init| {
                let job = ProcessJob::from_init(&init)?;
                Ok(Box::new(TaskWorker::new(&init, job)) as Box<dyn Worker>)
            })
            .register("null", |init| Ok(Box::new(TaskWorker::new(&init, NullJob)) as Box<dyn Worker>));
        for kind in ComputeKind::iter() {
            registry.register(kind.to_string(), move |init| {
                let job = ComputingJob::new(&init, kind);
                Ok(Box::new(TaskWorker::new(&init, job)) as Box<dyn Worker>)
            });
        }
        registry
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netbench_config::{
        RunConfig,
        WorkerSpec,
    };
    use pretty_assertions::assert_eq;

    fn init(spec: WorkerSpec) -> WorkerInit {
        WorkerInit {
            spec,
            config: Arc::new(RunConfig::default()),
            signals: Default::default(),
        }
    }

    #[test]
    fn default_kinds() {
        let registry = WorkerRegistry::default();
        assert_eq!(
            registry.kinds().collect::<Vec<_>>(),
            vec!["process", "null", "average", "smooth_average", "sum", "diff_min", "fairness"]
        );
    }

    #[test]
    fn unknown_kind_is_a_configuration_error() {
        let err = WorkerRegistry::default()
            .build(init(WorkerSpec::new("w", "iperf3")))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("'iperf3'")));
    }

    #[tokio::test]
    async fn builds_named_workers() {
        let worker = WorkerRegistry::default()
            .build(init(WorkerSpec::new("idle", "null")))
            .unwrap();
        assert_eq!(worker.name(), "idle");
        assert!(!worker.is_running());
    }
}
