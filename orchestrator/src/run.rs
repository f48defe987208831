use crate::{
    aggregator::Aggregator,
    registry::WorkerRegistry,
    supervisor::Supervisor,
    Error,
    Result,
    Shutdown,
};
use netbench_config::RunConfig;
use netbench_resultset::ResultSet;
use std::sync::Arc;

/// Run a complete test: collect data from all configured workers, align it
/// and apply the computed series.
#[instrument(level = "debug", skip_all, fields(name = %config.name))]
pub async fn run_test(config: Arc<RunConfig>, registry: WorkerRegistry, shutdown: Shutdown) -> Result<ResultSet> {
    let rs = ResultSet::new(config.to_metadata())?;
    let aggregator = Aggregator::from_config(&config);
    let supervisor = Supervisor::new(registry, config.clone(), shutdown);

    info!(
        workers = config.workers.len(),
        aggregator = %config.aggregator,
        length = %humantime::format_duration(config.length()),
        "starting test"
    );
    let (mut rs, postprocessors) = aggregator.aggregate(&supervisor, &config.workers, rs).await?;

    for postprocessor in postprocessors {
        let name = postprocessor.name().to_string();
        rs = postprocessor.apply(rs).map_err(|err| Error::Postprocessor {
            name,
            reason: err.to_string(),
        })?;
    }
    info!(points = rs.len(), series = rs.results().len(), "test complete");
    Ok(rs)
}
