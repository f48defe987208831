use serde::{
    Deserialize,
    Serialize,
};
use strum::{
    Display,
    EnumIter,
    EnumString,
};

/// Pure unit conversions that can be chained on a series.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataTransform {
    /// Transactions per second of a request/response test to latency in ms.
    RrToMs,
    SToMs,
    BitsToMbits,
    KbitsToMbits,
    /// Cumulative counter readings to per-sample increments.
    CumulativeToEvents,
    Identity,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("transform {transform} cannot be applied to {value}")]
pub struct TransformError {
    pub transform: DataTransform,
    pub value: f64,
}

impl DataTransform {
    /// Convert a single value. `Ok(None)` means the value has no defined
    /// result (a zero transaction rate has no latency).
    pub fn apply(self, value: f64) -> Result<Option<f64>, TransformError> {
        if !value.is_finite() {
            return Err(TransformError { transform: self, value });
        }
        let converted = match self {
            DataTransform::RrToMs if value == 0.0 => return Ok(None),
            DataTransform::RrToMs => 1000.0 / value,
            DataTransform::SToMs => value * 1000.0,
            DataTransform::BitsToMbits => value / 1_000_000.0,
            DataTransform::KbitsToMbits => value / 1000.0,
            // A lone value carries no history to difference against.
            DataTransform::CumulativeToEvents | DataTransform::Identity => value,
        };
        Ok(Some(converted))
    }

    /// Convert a time series in place. Samples without a defined result are
    /// dropped.
    pub fn apply_series(self, samples: &mut Vec<(f64, f64)>) -> Result<(), TransformError> {
        if self == DataTransform::CumulativeToEvents {
            let Some(&(_, first)) = samples.first() else {
                return Ok(());
            };
            let mut current = first;
            for (_, value) in samples.iter_mut() {
                let next = *value;
                *value = next - current;
                current = next;
            }
            return Ok(());
        }

        let mut converted = Vec::with_capacity(samples.len());
        for &(t, value) in samples.iter() {
            if let Some(value) = self.apply(value)? {
                converted.push((t, value));
            }
        }
        *samples = converted;
        Ok(())
    }

    /// Convert a sequence of nullable values, e.g. the `val` fields of raw
    /// samples. Null values stay null and do not break a cumulative chain.
    pub fn apply_values(self, values: &mut [Option<f64>]) -> Result<(), TransformError> {
        if self == DataTransform::CumulativeToEvents {
            let mut current = None;
            for value in values.iter_mut().filter(|v| v.is_some()) {
                let next = value.unwrap_or_default();
                *value = Some(next - current.unwrap_or(next));
                current = Some(next);
            }
            return Ok(());
        }
        for value in values.iter_mut() {
            if let Some(v) = *value {
                *value = self.apply(v)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr as _;

    #[test]
    fn names_match_config_spelling() {
        assert_eq!(DataTransform::from_str("rr_to_ms").unwrap(), DataTransform::RrToMs);
        assert_eq!(DataTransform::from_str("kbits_to_mbits").unwrap(), DataTransform::KbitsToMbits);
        assert_eq!(DataTransform::SToMs.to_string(), "s_to_ms");
    }

    #[test]
    fn zero_rate_has_no_latency() {
        assert_eq!(DataTransform::RrToMs.apply(0.0), Ok(None));
        assert_eq!(DataTransform::RrToMs.apply(500.0), Ok(Some(2.0)));
    }

    #[test]
    fn non_finite_input_is_an_error() {
        assert!(DataTransform::SToMs.apply(f64::NAN).is_err());
    }

    #[test]
    fn cumulative_series_become_increments() {
        let mut samples = vec![(0.0, 10.0), (1.0, 15.0), (2.0, 15.0), (3.0, 21.0)];
        DataTransform::CumulativeToEvents.apply_series(&mut samples).unwrap();
        assert_eq!(samples, vec![(0.0, 0.0), (1.0, 5.0), (2.0, 0.0), (3.0, 6.0)]);
    }

    #[test]
    fn undefined_series_samples_are_dropped() {
        let mut samples = vec![(0.0, 100.0), (1.0, 0.0), (2.0, 250.0)];
        DataTransform::RrToMs.apply_series(&mut samples).unwrap();
        assert_eq!(samples, vec![(0.0, 10.0), (2.0, 4.0)]);
    }

    #[test]
    fn nullable_values_keep_their_gaps() {
        let mut values = vec![Some(1.0), None, Some(4.0)];
        DataTransform::CumulativeToEvents.apply_values(&mut values).unwrap();
        assert_eq!(values, vec![Some(0.0), None, Some(3.0)]);
    }
}
