use crate::ParserKind;
use indexmap::IndexMap;
use netbench_resultset::DataTransform;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashSet,
    time::Duration,
};

pub const DEFAULT_KIND: &str = "process";
pub const DEFAULT_SMOOTH_STEPS: usize = 5;
pub const DUPLICATE_SEPARATOR: &str = "::";

/// Declarative description of one unit of work in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Key in the run file's `workers` map. For duplicated workers this is
    /// the expanded `name::n`.
    #[serde(skip)]
    pub name: String,
    /// Position in declaration order, after duplicate expansion.
    #[serde(skip)]
    pub idx: usize,

    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub parser: ParserKind,
    /// Seconds to wait after the start signal before doing anything.
    #[serde(default)]
    pub delay: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_after: Option<String>,
    /// Stop the worker gracefully when it is still running after this many
    /// seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_transform: Vec<DataTransform>,
    /// Metadata keys the transform chain is applied to as well.
    #[serde(default = "default_transformable")]
    pub transformable: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default = "default_duplicates")]
    pub duplicates: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_host: Option<String>,
    /// Glob patterns of the series a computing worker reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smooth_steps: Option<usize>,
}

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

fn default_transformable() -> Vec<String> {
    vec!["MEAN_VALUE".to_string()]
}

fn default_duplicates() -> usize {
    1
}

impl Default for WorkerSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            idx: 0,
            kind: default_kind(),
            command: None,
            parser: ParserKind::default(),
            delay: 0.0,
            run_after: None,
            kill_after: None,
            kill_timeout: None,
            data_transform: Vec::new(),
            transformable: default_transformable(),
            units: None,
            duplicates: default_duplicates(),
            remote_host: None,
            apply_to: Vec::new(),
            smooth_steps: None,
        }
    }
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn process(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::new(name, DEFAULT_KIND)
        }
    }

    pub fn with_parser(mut self, parser: ParserKind) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_run_after(mut self, name: impl Into<String>) -> Self {
        self.run_after = Some(name.into());
        self
    }

    pub fn with_kill_after(mut self, name: impl Into<String>) -> Self {
        self.kill_after = Some(name.into());
        self
    }

    pub fn with_transform(mut self, transform: DataTransform) -> Self {
        self.data_transform.push(transform);
        self
    }

    pub fn with_apply_to<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply_to = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay).unwrap_or_default()
    }

    pub fn kill_timeout(&self) -> Option<Duration> {
        self.kill_timeout
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|timeout| !timeout.is_zero())
    }

    pub fn smooth_steps(&self) -> usize {
        self.smooth_steps.unwrap_or(DEFAULT_SMOOTH_STEPS).max(1)
    }

    /// Copies named `base::1` to `base::n`. A count of one keeps the name.
    pub(crate) fn expand(self, name: &str) -> Vec<WorkerSpec> {
        if self.duplicates <= 1 {
            return vec![WorkerSpec {
                name: name.to_string(),
                duplicates: 1,
                ..self
            }];
        }
        (1..=self.duplicates)
            .map(|n| WorkerSpec {
                name: format!("{name}{DUPLICATE_SEPARATOR}{n}"),
                duplicates: 1,
                ..self.clone()
            })
            .collect()
    }
}

/// A loop in the `run_after` chains of `workers`, as the path from the first
/// worker on the loop back to itself. Workers on such a loop would wait for
/// each other forever.
pub fn find_run_after_cycle(workers: &IndexMap<String, WorkerSpec>) -> Option<Vec<String>> {
    let mut cleared: HashSet<&str> = HashSet::new();
    for start in workers.keys() {
        let mut path: Vec<&str> = Vec::new();
        let mut next = Some(start.as_str());
        while let Some(name) = next {
            if cleared.contains(name) {
                break;
            }
            if let Some(pos) = path.iter().position(|seen| *seen == name) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|seen| seen.to_string()).collect();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            path.push(name);
            next = workers.get(name).and_then(|spec| spec.run_after.as_deref());
        }
        cleared.extend(path);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_copies_keep_their_name() {
        let specs = WorkerSpec::process("", "ping host").expand("ping");
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "ping");
    }

    #[test]
    fn durations_ignore_nonsense() {
        let mut spec = WorkerSpec::new("w", "null");
        spec.delay = -1.0;
        spec.kill_timeout = Some(0.0);
        assert_eq!(spec.delay(), Duration::ZERO);
        assert_eq!(spec.kill_timeout(), None);
        spec.kill_timeout = Some(1.5);
        assert_eq!(spec.kill_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(spec.smooth_steps(), DEFAULT_SMOOTH_STEPS);

        spec.delay = 1e30;
        spec.kill_timeout = Some(f64::INFINITY);
        assert_eq!(spec.delay(), Duration::ZERO);
        assert_eq!(spec.kill_timeout(), None);
    }

    fn chain(edges: &[(&str, Option<&str>)]) -> IndexMap<String, WorkerSpec> {
        edges
            .iter()
            .map(|(name, after)| {
                let mut spec = WorkerSpec::process(*name, "true");
                spec.run_after = after.map(str::to_string);
                (name.to_string(), spec)
            })
            .collect()
    }

    #[test]
    fn run_after_loops_are_found() {
        let workers = chain(&[("a", None), ("b", Some("a")), ("c", Some("b"))]);
        assert_eq!(find_run_after_cycle(&workers), None);

        let workers = chain(&[("x", Some("a")), ("a", Some("b")), ("b", Some("c")), ("c", Some("a"))]);
        assert_eq!(
            find_run_after_cycle(&workers),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string(), "a".to_string()])
        );

        let workers = chain(&[("a", Some("ghost"))]);
        assert_eq!(find_run_after_cycle(&workers), None);
    }
}
