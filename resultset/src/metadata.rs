use chrono::{
    DateTime,
    Local,
    NaiveDateTime,
    TimeZone as _,
    Utc,
};
use derive_more::Deref;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};

/// Metadata keys holding timestamps. They are kept in memory as canonical
/// UTC strings and normalised on load.
pub const TIME_SETTINGS: [&str; 3] = ["TIME", "BATCH_TIME", "T0"];

const UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Separator for nested metadata lookups, e.g. `SERIES_META:ping:UNITS`.
const PATH_SEPARATOR: char = ':';

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(UTC_FORMAT).to_string()
}

/// Seconds since the epoch with microsecond resolution.
pub fn epoch_seconds(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1_000_000.0
}

pub fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros)
}

/// Parse a stored timestamp. Strings with a trailing `Z` are UTC, strings
/// without one were written in local time by older versions.
pub fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if let Some(utc) = value.strip_suffix('Z') {
        return ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(utc, fmt).ok())
            .map(|naive| naive.and_utc());
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Some(time.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
}

/// Ordered key/value metadata of a result set.
#[derive(Debug, Clone, Default, PartialEq, Deref, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Mutable access to a nested object, creating it (or replacing a
    /// non-object value) when needed.
    pub fn object_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let entry = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just replaced by an object"),
        }
    }

    /// Look up a key, falling back to walking nested objects and arrays by
    /// `:`-separated path segments. Integer segments index arrays.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }
        let mut parts = path.split(PATH_SEPARATOR);
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                Value::Object(map) => map.get(part)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn set_time(&mut self, key: impl Into<String>, time: DateTime<Utc>) {
        self.set(key, format_time(&time));
    }

    pub fn time(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_str(key).and_then(parse_time)
    }

    /// Rewrite every timestamp setting into the canonical UTC format.
    pub(crate) fn normalize_times(&mut self) -> Result<(), String> {
        for key in TIME_SETTINGS {
            let Some(raw) = self.get_str(key) else {
                continue;
            };
            let time = parse_time(raw).ok_or_else(|| format!("invalid timestamp '{raw}' for {key}"))?;
            self.set_time(key, time);
        }
        Ok(())
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{
        TimeZone as _,
        Timelike as _,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn nested_lookup_walks_objects_and_arrays() {
        let mut meta = Metadata::new();
        meta.set("HOSTS", json!(["a.example", "b.example"]));
        meta.set("SERIES_META", json!({"ping": {"UNITS": "ms"}}));
        meta.set("odd:key", 3);

        assert_eq!(meta.lookup("HOSTS:1"), Some(&json!("b.example")));
        assert_eq!(meta.lookup("SERIES_META:ping:UNITS"), Some(&json!("ms")));
        assert_eq!(meta.lookup("odd:key"), Some(&json!(3)));
        assert_eq!(meta.lookup("SERIES_META:tcp:UNITS"), None);
        assert_eq!(meta.lookup("HOSTS:x"), None);
    }

    #[test]
    fn times_use_utc_microsecond_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap().with_nanosecond(250_000_000).unwrap();
        let mut meta = Metadata::new();
        meta.set_time("TIME", time);
        assert_eq!(meta.get_str("TIME"), Some("2024-03-01T12:30:05.250000Z"));
        assert_eq!(meta.time("TIME"), Some(time));
    }

    #[test]
    fn epoch_seconds_round_trip() {
        let time = from_epoch_seconds(1_700_000_000.123456).unwrap();
        assert_eq!(format_time(&time), "2023-11-14T22:13:20.123456Z");
        assert!((epoch_seconds(&time) - 1_700_000_000.123456).abs() < 1e-6);
    }

    #[test]
    fn normalizes_times_without_fraction() {
        let mut meta = Metadata::new();
        meta.set("T0", "2024-03-01T12:30:05Z");
        meta.normalize_times().unwrap();
        assert_eq!(meta.get_str("T0"), Some("2024-03-01T12:30:05.000000Z"));
    }

    #[test]
    fn rejects_garbage_times() {
        let mut meta = Metadata::new();
        meta.set("TIME", "yesterday");
        assert!(meta.normalize_times().is_err());
    }

    #[test]
    fn object_mut_creates_nested_maps() {
        let mut meta = Metadata::new();
        meta.object_mut("TEST_PARAMETERS").insert("qdisc".into(), json!("fq_codel"));
        assert_eq!(meta.lookup("TEST_PARAMETERS:qdisc"), Some(&json!("fq_codel")));
    }
}
