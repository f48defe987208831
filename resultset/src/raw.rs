use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};

/// Key of the primary measured value inside a raw sample.
pub(crate) const VALUE_KEY: &str = "val";

/// One unprocessed sample as reported by a measurement tool. Always has an
/// absolute timestamp (seconds since the epoch); everything else is tool
/// specific, though most tools report their main value under `val`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub t: f64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawSample {
    pub fn new(t: f64, value: f64) -> Self {
        let mut fields = Map::new();
        fields.insert(VALUE_KEY.to_string(), value.into());
        Self { t, fields }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn value(&self) -> Option<f64> {
        self.fields.get(VALUE_KEY).and_then(Value::as_f64)
    }

    pub fn set_value(&mut self, value: Option<f64>) {
        self.fields.insert(VALUE_KEY.to_string(), value.map_or(Value::Null, Value::from));
    }
}
