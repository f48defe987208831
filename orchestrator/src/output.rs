use crate::Result;
use indexmap::IndexMap;
use netbench_resultset::{
    Metadata,
    RawSample,
    ResultSet,
};
use std::fmt;

/// A single named value produced by a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Scalar(Option<f64>),
    /// `(time, value)` samples, time in seconds since the epoch.
    Series(Vec<(f64, f64)>),
}

/// Everything a worker can yield once it is done.
#[derive(Debug, Default)]
pub enum WorkerResult {
    /// Nothing usable. Counts as a failed worker unless the worker is silent.
    #[default]
    Empty,
    Scalar(f64),
    Series(Vec<(f64, f64)>),
    /// Several values, merged as `<worker>::<key>`.
    Named(IndexMap<String, Measurement>),
    /// A computation over the finished result set.
    Deferred(Postprocessor),
}

impl WorkerResult {
    pub fn is_empty(&self) -> bool {
        match self {
            WorkerResult::Empty => true,
            WorkerResult::Named(values) => values.is_empty(),
            WorkerResult::Series(samples) => samples.is_empty(),
            _ => false,
        }
    }
}

type PostprocessFn = Box<dyn FnOnce(ResultSet) -> Result<ResultSet> + Send>;

/// Function applied to the whole result set after all direct results are
/// merged.
pub struct Postprocessor {
    name: String,
    apply: PostprocessFn,
}

impl Postprocessor {
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: FnOnce(ResultSet) -> Result<ResultSet> + Send + 'static,
    {
        Self {
            name: name.into(),
            apply: Box::new(apply),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(self, rs: ResultSet) -> Result<ResultSet> {
        debug!(postprocessor = %self.name, "applying postprocessor");
        (self.apply)(rs)
    }
}

impl fmt::Debug for Postprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Postprocessor").field("name", &self.name).finish_non_exhaustive()
    }
}

/// What a worker leaves behind for the debug log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub command: Option<String>,
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Default)]
pub struct WorkerOutput {
    pub result: WorkerResult,
    pub raw_values: Vec<RawSample>,
    pub metadata: Metadata,
    pub diagnostics: Diagnostics,
    /// The worker is not expected to produce data.
    pub silent: bool,
}

impl WorkerOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn with_result(mut self, result: WorkerResult) -> Self {
        self.result = result;
        self
    }

    /// Whether the supervisor counts this output as a failed worker.
    pub fn is_failure(&self) -> bool {
        !self.silent && self.result.is_empty()
    }
}
