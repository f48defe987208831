use super::record_collected;
use crate::{
    output::{
        Measurement,
        Postprocessor,
    },
    supervisor::Supervisor,
    Result,
};
use indexmap::IndexMap;
use netbench_config::WorkerSpec;
use netbench_resultset::ResultSet;

/// Runs all workers `iterations` times; every worker contributes one
/// scalar per iteration at x = iteration index.
#[derive(Debug, Clone)]
pub struct IterationAggregator {
    iterations: usize,
}

impl IterationAggregator {
    pub fn new(iterations: usize) -> Self {
        Self { iterations }
    }

    pub async fn aggregate(
        &self,
        supervisor: &Supervisor,
        specs: &IndexMap<String, WorkerSpec>,
        mut rs: ResultSet,
    ) -> Result<(ResultSet, Vec<Postprocessor>)> {
        let mut postprocessors = Vec::new();
        for i in 0..self.iterations {
            if supervisor.shutdown().is_requested() {
                info!(completed = i, "shutdown requested, not starting further iterations");
                break;
            }
            debug!(iteration = i, of = self.iterations, "starting iteration");

            let mut collected = supervisor.collect(specs).await?;
            record_collected(&mut rs, &mut collected);
            if i == 0 {
                rs.create_series(collected.results.keys());
            }
            let datapoint = collected.results.into_iter().map(|(name, measurement)| {
                let value = match measurement {
                    Measurement::Scalar(value) => value,
                    Measurement::Series(_) => {
                        warn!(series = %name, "series result in an iteration run, recording null");
                        None
                    }
                };
                (name, value)
            });
            rs.append_datapoint(i as f64, datapoint)?;
            postprocessors = collected.postprocessors;
        }
        Ok((rs, postprocessors))
    }
}
