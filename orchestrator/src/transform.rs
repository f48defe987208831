use crate::{
    output::Measurement,
    Error,
    Result,
};
use netbench_resultset::{
    DataTransform,
    Metadata,
    RawSample,
    TransformError,
};

/// The ordered transforms configured for one worker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransformChain<'a>(pub &'a [DataTransform]);

impl TransformChain<'_> {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn scalar(&self, value: Option<f64>) -> Result<Option<f64>, TransformError> {
        self.0
            .iter()
            .try_fold(value, |value, transform| value.map_or(Ok(None), |v| transform.apply(v)))
    }

    pub fn measurement(&self, series: &str, measurement: &mut Measurement) -> Result<()> {
        let result = match measurement {
            Measurement::Scalar(value) => self.scalar(*value).map(|converted| *value = converted),
            Measurement::Series(samples) => self
                .0
                .iter()
                .try_for_each(|transform| transform.apply_series(samples)),
        };
        result.map_err(|source| Error::Transform {
            series: series.to_string(),
            source,
        })
    }

    /// Convert the given metadata keys. Values that cannot be converted are
    /// left as they are.
    pub fn metadata(&self, keys: &[String], metadata: &mut Metadata) {
        for key in keys {
            let Some(value) = metadata.get_f64(key) else {
                continue;
            };
            match self.scalar(Some(value)) {
                Ok(converted) => metadata.set(key.clone(), converted),
                Err(err) => trace!(key = %key, "metadata not transformed: {err}"),
            }
        }
    }

    pub fn raw_values(&self, series: &str, samples: &mut [RawSample]) {
        let mut values: Vec<Option<f64>> = samples.iter().map(RawSample::value).collect();
        if let Err(err) = self.0.iter().try_for_each(|transform| transform.apply_values(&mut values)) {
            warn!(series, "raw values not transformed: {err}");
            return;
        }
        for (sample, value) in samples.iter_mut().zip(values) {
            sample.set_value(value);
        }
    }

    /// Recorded as `DATA_TRANSFORM` in the series metadata.
    pub fn describe(&self) -> String {
        self.0.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
    }
}
