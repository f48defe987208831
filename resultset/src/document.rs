//! On-disk document layout and the migrations from older format versions.

use crate::{
    error::{
        Error,
        Result,
    },
    metadata::{
        epoch_seconds,
        parse_time,
        Metadata,
    },
    raw::{
        RawSample,
        VALUE_KEY,
    },
    transform::DataTransform,
};
use indexmap::IndexMap;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    json,
    Map,
    Value,
};
use std::str::FromStr as _;

/// Version of the document layout written by this build.
pub const FORMAT_VERSION: u64 = 3;

/// Metadata keys renamed between versions 1 and 2.
const LEGACY_RENAMES: [(&str, &str); 1] = [("NETPERF_WRAPPER_VERSION", "TOOL_VERSION")];

#[derive(Serialize)]
pub(crate) struct DocumentRef<'a> {
    pub metadata: &'a Metadata,
    pub version: u64,
    pub x_values: &'a [f64],
    pub results: &'a IndexMap<String, Vec<Option<f64>>>,
    pub raw_values: &'a IndexMap<String, Vec<RawSample>>,
}

#[derive(Deserialize)]
pub(crate) struct Document {
    pub metadata: Metadata,
    pub x_values: Vec<f64>,
    pub results: IndexMap<String, Vec<Option<f64>>>,
    #[serde(default)]
    pub raw_values: IndexMap<String, Vec<RawSample>>,
}

/// Parse a document of any supported version into the current layout.
pub(crate) fn parse(content: &str) -> Result<Document> {
    let mut value: Value = serde_json::from_str(content).map_err(|source| Error::Json { path: None, source })?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| invalid("the document is not a JSON object"))?;

    let version = document_version(object);
    if version > FORMAT_VERSION {
        return Err(Error::UnsupportedVersion {
            version,
            supported: FORMAT_VERSION,
            path: None,
        });
    }
    if version < FORMAT_VERSION {
        debug!(version, current = FORMAT_VERSION, "migrating result document");
        migrate(version, object)?;
    }
    object.insert("version".to_string(), FORMAT_VERSION.into());

    serde_json::from_value(value).map_err(|source| Error::Json { path: None, source })
}

/// Documents without a usable version field predate versioning.
fn document_version(object: &Map<String, Value>) -> u64 {
    let version = match object.get("version") {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|v| *v >= 0.0 && v.fract() == 0.0)
                .map(|v| v as u64)
        }),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    version.map_or(1, |version| version.max(1))
}

fn migrate(from: u64, object: &mut Map<String, Value>) -> Result<()> {
    for version in from..FORMAT_VERSION {
        match version {
            1 => migrate_v1(object)?,
            2 => migrate_v2(object)?,
            other => return Err(invalid(format!("no migration path from version {other}"))),
        }
    }
    Ok(())
}

/// Version 1 kept raw values inside the per-series metadata, and very old
/// files have none at all. In that case the interpolated series stand in
/// for the raw values so later code can rely on them being present.
fn migrate_v1(object: &mut Map<String, Value>) -> Result<()> {
    let mut raw_values = Map::new();
    {
        let metadata = metadata_mut(object)?;
        if let Some(Value::Object(series_meta)) = metadata.get_mut("SERIES_META") {
            for (name, meta) in series_meta.iter_mut() {
                if let Some(raw) = meta.as_object_mut().and_then(|meta| meta.shift_remove("RAW_VALUES")) {
                    raw_values.insert(name.clone(), raw);
                }
            }
        }
        for (old, new) in LEGACY_RENAMES {
            if let Some(value) = metadata.shift_remove(old) {
                metadata.insert(new.to_string(), value);
            }
        }
    }

    if raw_values.is_empty() {
        let metadata = metadata_mut(object)?;
        let t0 = ["T0", "TIME"]
            .iter()
            .find_map(|key| metadata.get(*key).and_then(Value::as_str).and_then(parse_time))
            .ok_or_else(|| invalid("neither T0 nor TIME is set, raw values cannot be reconstructed"))?;
        let x0 = epoch_seconds(&t0);
        metadata.insert("FAKE_RAW_VALUES".to_string(), true.into());

        let x_values: Vec<f64> = object
            .get("x_values")
            .and_then(Value::as_array)
            .map(|xs| xs.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        if let Some(Value::Object(results)) = object.get("results") {
            for (name, series) in results {
                let samples = series
                    .as_array()
                    .map(|values| {
                        x_values
                            .iter()
                            .zip(values)
                            .map(|(x, value)| json!({"t": x0 + x, VALUE_KEY: value}))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                raw_values.insert(name.clone(), Value::Array(samples));
            }
        }
    }

    object.insert("raw_values".to_string(), Value::Object(raw_values));
    Ok(())
}

/// Since version 3 the transform chain of a series is applied to its raw
/// values as well. Older documents get that conversion on load.
fn migrate_v2(object: &mut Map<String, Value>) -> Result<()> {
    let chains: Vec<(String, Vec<DataTransform>)> = {
        let metadata = metadata_mut(object)?;
        match metadata.get("SERIES_META") {
            Some(Value::Object(series_meta)) => series_meta
                .iter()
                .filter_map(|(name, meta)| {
                    let chain = transform_chain(meta.get("DATA_TRANSFORM")?);
                    (!chain.is_empty()).then(|| (name.clone(), chain))
                })
                .collect(),
            _ => Vec::new(),
        }
    };

    let Some(Value::Object(raw_values)) = object.get_mut("raw_values") else {
        return Ok(());
    };
    for (name, chain) in chains {
        let Some(Value::Array(samples)) = raw_values.get_mut(&name) else {
            continue;
        };
        let mut values: Vec<Option<f64>> = samples
            .iter()
            .map(|sample| sample.get(VALUE_KEY).and_then(Value::as_f64))
            .collect();
        for transform in chain {
            let mut converted = values.clone();
            match transform.apply_values(&mut converted) {
                Ok(()) => values = converted,
                Err(err) => warn!(series = %name, "skipping raw value migration step: {err}"),
            }
        }
        for (sample, value) in samples.iter_mut().zip(values) {
            if let (Some(sample), Some(value)) = (sample.as_object_mut(), value) {
                sample.insert(VALUE_KEY.to_string(), value.into());
            }
        }
    }
    Ok(())
}

fn transform_chain(value: &Value) -> Vec<DataTransform> {
    let names: Vec<&str> = match value {
        Value::String(names) => names.split(',').map(str::trim).collect(),
        Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    names
        .into_iter()
        .filter_map(|name| match DataTransform::from_str(name) {
            Ok(transform) => Some(transform),
            Err(_) => {
                warn!(name, "ignoring unknown data transform in stored metadata");
                None
            }
        })
        .collect()
}

fn metadata_mut(object: &mut Map<String, Value>) -> Result<&mut Map<String, Value>> {
    object
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| invalid("missing metadata object"))
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidDocument {
        path: None,
        reason: reason.into(),
    }
}
