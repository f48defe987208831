use super::record_collected;
use crate::{
    output::{
        Measurement,
        Postprocessor,
    },
    supervisor::Supervisor,
    Error,
    Result,
};
use indexmap::IndexMap;
use netbench_config::WorkerSpec;
use netbench_resultset::{
    from_epoch_seconds,
    ResultSet,
};

/// Samples further than this many steps from the grid point are not used.
const MAX_DISTANCE_STEPS: f64 = 5.0;
/// Allowed distance on the first grid point when nothing precedes it.
const FIRST_POINT_STEPS: f64 = 0.5;

/// Runs all workers once and aligns their time series on a common grid.
#[derive(Debug, Clone)]
pub struct TimeseriesAggregator {
    step: f64,
}

impl TimeseriesAggregator {
    pub fn new(step: f64) -> Self {
        Self { step }
    }

    pub async fn aggregate(
        &self,
        supervisor: &Supervisor,
        specs: &IndexMap<String, WorkerSpec>,
        mut rs: ResultSet,
    ) -> Result<(ResultSet, Vec<Postprocessor>)> {
        let mut collected = supervisor.collect(specs).await?;
        if collected.stopped {
            info!("aligning partial data after graceful shutdown");
        }
        if collected.results.is_empty() {
            return Err(Error::no_data());
        }
        record_collected(&mut rs, &mut collected);

        let mut measurements: IndexMap<String, Vec<(f64, f64)>> = IndexMap::new();
        for (name, measurement) in collected.results {
            match measurement {
                Measurement::Series(mut samples) => {
                    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
                    measurements.insert(name, samples);
                }
                Measurement::Scalar(_) => warn!(series = %name, "scalar result in a time series run, skipping"),
            }
        }

        let first = measurements.values().filter_map(|samples| samples.first()).map(|s| s.0);
        let last = measurements.values().filter_map(|samples| samples.last()).map(|s| s.0);
        let (Some(t0), Some(t_max)) = (first.reduce(f64::min), last.reduce(f64::max)) else {
            return Err(Error::no_data());
        };

        rs.create_series(measurements.keys());
        match from_epoch_seconds(t0) {
            Some(time) => rs.metadata_mut().set_time("T0", time),
            None => warn!(t0, "first sample time is not a valid timestamp"),
        }

        let steps = ((t_max - t0) / self.step).ceil() as usize;
        debug!(steps, step = self.step, "aligning series");
        for s in 0..steps {
            let t = t0 + self.step * s as f64;
            let datapoint: Vec<(&str, Option<f64>)> = measurements
                .iter()
                .map(|(name, samples)| {
                    let value = self.value_at(samples, t, s == 0, rs.last_datapoint(name));
                    (name.as_str(), value)
                })
                .collect();
            rs.append_datapoint(self.step * s as f64, datapoint)?;
        }
        Ok((rs, collected.postprocessors))
    }

    /// Value of a series at grid time `t`, given the last value emitted
    /// for it so far.
    fn value_at(&self, samples: &[(f64, f64)], t: f64, first_point: bool, last_emitted: Option<f64>) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let mut max_distance = self.step * MAX_DISTANCE_STEPS;
        let next = samples.iter().position(|&(time, _)| time > t);
        let (prev, (t_next, v_next), at_tail) = match next {
            Some(0) => {
                if first_point {
                    max_distance = self.step * FIRST_POINT_STEPS;
                }
                (None, samples[0], false)
            }
            Some(i) => (Some(samples[i - 1]), samples[i], false),
            None => (None, samples[samples.len() - 1], true),
        };

        if (t - t_next).abs() > max_distance {
            return None;
        }
        match prev {
            None if at_tail && last_emitted.map_or(true, |last| last == v_next) => None,
            None => Some(v_next),
            Some((t_prev, v_prev)) => Some(v_prev + (v_next - v_prev) / (t_next - t_prev) * (t - t_prev)),
        }
    }
}
