use serde::{
    Deserialize,
    Serialize,
};
use strum::{
    Display,
    EnumIter,
    EnumString,
};

/// How the collected worker output is turned into a result set.
#[derive(Debug, Default, Clone, Copy, Display, EnumIter, EnumString, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AggregatorKind {
    /// Run every worker once and align their samples on a common time grid.
    #[default]
    Timeseries,
    /// Run every worker `iterations` times, one scalar per worker per run.
    Iteration,
}

/// Interpretation of a process worker's standard output.
#[derive(Debug, Default, Clone, Copy, Display, EnumIter, EnumString, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParserKind {
    /// Last whitespace separated token as a single value.
    #[default]
    LastValue,
    /// One `<time> <value>` pair per line.
    Pairs,
    /// Blocks separated by `---`, each with a `Time: <epoch>` line.
    Timestamped,
    /// Output is ignored. The worker runs for its side effects.
    Silent,
}
