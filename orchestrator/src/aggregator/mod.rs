//! Drivers that call the supervisor and shape what it collected into a
//! result set.

use crate::{
    output::Postprocessor,
    supervisor::{
        Collected,
        Supervisor,
    },
    Result,
};
use indexmap::IndexMap;
use netbench_config::{
    AggregatorKind,
    RunConfig,
    WorkerSpec,
};
use netbench_resultset::ResultSet;
use serde_json::Value;

mod iteration;
mod timeseries;

pub use iteration::IterationAggregator;
pub use timeseries::TimeseriesAggregator;

#[derive(Debug, Clone)]
pub enum Aggregator {
    Iteration(IterationAggregator),
    Timeseries(TimeseriesAggregator),
}

impl Aggregator {
    pub fn from_config(config: &RunConfig) -> Self {
        match config.aggregator {
            AggregatorKind::Iteration => Aggregator::Iteration(IterationAggregator::new(config.iterations)),
            AggregatorKind::Timeseries => Aggregator::Timeseries(TimeseriesAggregator::new(config.step_size)),
        }
    }

    /// Collect data into `rs`. The returned postprocessors still have to be
    /// applied, in order.
    pub async fn aggregate(
        &self,
        supervisor: &Supervisor,
        specs: &IndexMap<String, WorkerSpec>,
        rs: ResultSet,
    ) -> Result<(ResultSet, Vec<Postprocessor>)> {
        match self {
            Aggregator::Iteration(aggregator) => aggregator.aggregate(supervisor, specs, rs).await,
            Aggregator::Timeseries(aggregator) => aggregator.aggregate(supervisor, specs, rs).await,
        }
    }
}

/// Replace the per-run bookkeeping of `rs` with that of `collected`.
fn record_collected(rs: &mut ResultSet, collected: &mut Collected) {
    let metadata = rs.metadata_mut();
    metadata.set("SERIES_META", Value::Object(std::mem::take(&mut collected.series_meta)));
    metadata.set("FAILED_RUNNERS", collected.failed_workers);
    rs.set_raw_values(std::mem::take(&mut collected.raw_values));
}
