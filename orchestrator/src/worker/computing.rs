//! Series computed from other series once the run is complete.

use super::{
    Job,
    JobContext,
    WorkerInit,
};
use crate::{
    output::{
        Postprocessor,
        WorkerOutput,
        WorkerResult,
    },
    Result,
};
use netbench_resultset::ResultSet;
use regex::Regex;
use serde_json::{
    json,
    Map,
    Value,
};
use std::collections::VecDeque;
use strum::{
    Display,
    EnumIter,
    EnumString,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ComputeKind {
    Average,
    /// Trailing mean over the last `smooth_steps` row averages.
    SmoothAverage,
    Sum,
    /// The first source minus its own minimum.
    DiffMin,
    /// Jain's fairness index.
    Fairness,
}

impl ComputeKind {
    fn compute(self, values: &[f64]) -> Option<f64> {
        let n = values.len() as f64;
        let sum: f64 = values.iter().sum();
        match self {
            ComputeKind::Average | ComputeKind::SmoothAverage | ComputeKind::DiffMin => Some(sum / n),
            ComputeKind::Sum => Some(sum),
            ComputeKind::Fairness => {
                let squares: f64 = values.iter().map(|v| v * v).sum();
                (squares > 0.0).then(|| sum * sum / (n * squares))
            }
        }
    }

    fn compute_series(self, rs: &ResultSet, keys: &[&str], smooth_steps: usize) -> Vec<Option<f64>> {
        if self == ComputeKind::DiffMin {
            let Some(first) = keys.first() else {
                return vec![None; rs.len()];
            };
            let series = rs.series(first);
            let min = series.iter().flatten().copied().reduce(f64::min);
            return series.iter().map(|&value| Some(value? - min?)).collect();
        }

        let mut window = VecDeque::with_capacity(smooth_steps + 1);
        rs.zipped(keys)
            .map(|(_, row)| {
                let values: Vec<f64> = row.into_iter().flatten().collect();
                if values.is_empty() {
                    return None;
                }
                let value = self.compute(&values)?;
                if self != ComputeKind::SmoothAverage {
                    return Some(value);
                }
                window.push_back(value);
                while window.len() > smooth_steps {
                    window.pop_front();
                }
                Some(window.iter().sum::<f64>() / window.len() as f64)
            })
            .collect()
    }
}

/// Expand glob patterns against series names, in pattern order. `*` and `?`
/// stay within one `:`-separated segment, `**` matches across segments.
/// Entries without glob characters are taken literally.
pub fn expand_patterns(patterns: &[String], names: &[&str], exclude: &[&str]) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?']) {
            expanded.push(pattern.clone());
            continue;
        }
        let regex = match glob_regex(pattern) {
            Ok(regex) => regex,
            Err(err) => {
                warn!("invalid pattern '{pattern}': {err}");
                continue;
            }
        };
        for name in names {
            if regex.is_match(name) && !exclude.contains(name) && !expanded.iter().any(|e| e == name) {
                expanded.push(name.to_string());
            }
        }
    }
    expanded
}

fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                expr.push_str(".*");
            }
            '*' => expr.push_str("[^:]*"),
            '?' => expr.push_str("[^:]"),
            c => expr.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

#[derive(Debug, Clone)]
pub struct ComputingJob {
    name: String,
    idx: usize,
    kind: ComputeKind,
    apply_to: Vec<String>,
    smooth_steps: usize,
}

impl ComputingJob {
    pub fn new(init: &WorkerInit, kind: ComputeKind) -> Self {
        Self {
            name: init.spec.name.clone(),
            idx: init.spec.idx,
            kind,
            apply_to: init.spec.apply_to.clone(),
            smooth_steps: init.spec.smooth_steps(),
        }
    }

    /// Add the computed series and its `SERIES_META` entry to `rs`.
    pub fn apply(&self, mut rs: ResultSet) -> Result<ResultSet> {
        let names: Vec<&str> = rs.series_names().collect();
        let keys = expand_patterns(&self.apply_to, &names, &[self.name.as_str()]);
        if keys.is_empty() {
            warn!(worker = %self.name, "no series to compute from");
        }
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let values = self.kind.compute_series(&rs, &key_refs, self.smooth_steps);
        rs.add_result(self.name.clone(), values)?;

        let series_meta = rs.metadata_mut().object_mut("SERIES_META");
        let mut meta = Map::new();
        meta.insert("RUNNER".to_string(), json!(self.kind.to_string()));
        meta.insert("IDX".to_string(), json!(self.idx));
        meta.insert("COMPUTED_LATE".to_string(), json!(true));

        let source_meta = |field: &str| -> Vec<Value> {
            keys.iter()
                .filter_map(|key| series_meta.get(key)?.get(field))
                .filter(|value| !value.is_null())
                .cloned()
                .collect()
        };
        let means: Vec<f64> = source_meta("MEAN_VALUE").iter().filter_map(Value::as_f64).collect();
        if !means.is_empty() && self.kind != ComputeKind::DiffMin {
            if let Some(mean) = self.kind.compute(&means) {
                meta.insert("MEAN_VALUE".to_string(), json!(mean));
            }
        }
        let mut units = source_meta("UNITS");
        if !units.is_empty() {
            let unit = if units.windows(2).all(|pair| pair[0] == pair[1]) {
                units.swap_remove(0)
            } else {
                Value::Array(units)
            };
            meta.insert("UNITS".to_string(), unit);
        }
        series_meta.insert(self.name.clone(), Value::Object(meta));
        Ok(rs)
    }
}

impl Job for ComputingJob {
    fn describe(&self) -> String {
        format!("{} of {}", self.kind, self.apply_to.join(", "))
    }

    async fn run(self, _ctx: JobContext) -> WorkerOutput {
        let name = self.name.clone();
        WorkerOutput::empty().with_result(WorkerResult::Deferred(Postprocessor::new(name, move |rs| {
            self.apply(rs)
        })))
    }
}
