use crate::{
    compression::Compression,
    document::{
        self,
        DocumentRef,
        FORMAT_VERSION,
    },
    error::{
        Error,
        Result,
    },
    metadata::{
        epoch_seconds,
        Metadata,
    },
    raw::RawSample,
};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::{
    borrow::Cow,
    path::{
        Path,
        PathBuf,
    },
};

/// Default suffix of result files.
pub const SUFFIX: &str = ".netbench.gz";

/// Most filesystems cap names at 255 bytes.
pub const MAX_FILENAME_LEN: usize = 250;

/// Run settings copied into the metadata of every new result set.
pub const RECORDED_SETTINGS: [&str; 16] = [
    "NAME",
    "HOST",
    "HOSTS",
    "TIME",
    "LOCAL_HOST",
    "TITLE",
    "NOTE",
    "LENGTH",
    "TOTAL_LENGTH",
    "STEP_SIZE",
    "TEST_PARAMETERS",
    "TOOL_VERSION",
    "IP_VERSION",
    "DATA_FILENAME",
    "ITERATIONS",
    "AGGREGATOR",
];

const FILENAME_TIME_FORMAT: &str = "%Y-%m-%dT%H%M%S%.6f";
const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Aligned measurement data of one run.
///
/// Every declared series has exactly one (nullable) value per x value at
/// all times; the only ways to add data keep that property.
#[derive(Debug, Clone)]
pub struct ResultSet {
    metadata: Metadata,
    x_values: Vec<f64>,
    results: IndexMap<String, Vec<Option<f64>>>,
    raw_values: IndexMap<String, Vec<RawSample>>,
    suffix: String,
    absolute: bool,
    loaded_from: Option<PathBuf>,
    label: Option<String>,
}

impl PartialEq for ResultSet {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata
            && self.x_values == other.x_values
            && self.results == other.results
            && self.raw_values == other.raw_values
    }
}

impl ResultSet {
    /// Create an empty result set. `NAME` is required; `TIME` defaults to
    /// now and `DATA_FILENAME` is generated when absent.
    pub fn new(metadata: Metadata) -> Result<Self> {
        Self::with_suffix(metadata, SUFFIX)
    }

    pub fn with_suffix(mut metadata: Metadata, suffix: impl Into<String>) -> Result<Self> {
        if metadata.get_str("NAME").map_or(true, str::is_empty) {
            return Err(Error::MissingName);
        }
        if metadata.time("TIME").is_none() {
            metadata.set_time("TIME", Utc::now());
        }

        let mut rs = Self {
            metadata,
            x_values: Vec::new(),
            results: IndexMap::new(),
            raw_values: IndexMap::new(),
            suffix: suffix.into(),
            absolute: false,
            loaded_from: None,
            label: None,
        };

        let mut filename = match rs.metadata.get_str("DATA_FILENAME") {
            Some(filename) => filename.to_string(),
            None => rs.gen_filename(),
        };
        if !filename.ends_with(&rs.suffix) {
            filename.push_str(&rs.suffix);
        }
        rs.metadata.set("DATA_FILENAME", filename);
        Ok(rs)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Nested metadata lookup, see [`Metadata::lookup`].
    pub fn meta(&self, path: &str) -> Result<&Value> {
        self.metadata
            .lookup(path)
            .ok_or_else(|| Error::MissingMetadata(path.to_string()))
    }

    pub fn x_values(&self) -> &[f64] {
        &self.x_values
    }

    /// Set the whole x axis at once. Only allowed while it is still empty
    /// and no series has been declared yet.
    pub fn set_x_values(&mut self, x_values: Vec<f64>) -> Result<()> {
        if !self.x_values.is_empty() || self.results.values().any(|series| !series.is_empty()) {
            return Err(Error::XValuesAlreadySet);
        }
        self.results
            .values_mut()
            .for_each(|series| series.resize(x_values.len(), None));
        self.x_values = x_values;
        Ok(())
    }

    /// Declare series. Series declared late are back-filled with nulls.
    pub fn create_series<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let len = self.x_values.len();
        for name in names {
            self.results.entry(name.into()).or_insert_with(|| vec![None; len]);
        }
    }

    /// Append one x position and one value to every declared series,
    /// null where `data` has nothing for it. Data for undeclared series is
    /// rejected before anything is appended.
    pub fn append_datapoint<I, S>(&mut self, x: f64, data: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Option<f64>)>,
        S: Into<String>,
    {
        let mut data: IndexMap<String, Option<f64>> = data.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let unknown: Vec<String> = data
            .keys()
            .filter(|name| !self.results.contains_key(*name))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(Error::UnknownSeries(unknown));
        }

        self.x_values.push(x);
        for (name, series) in self.results.iter_mut() {
            series.push(data.swap_remove(name).flatten());
        }
        Ok(())
    }

    /// Add (or replace) a complete series, e.g. one computed from others
    /// after the run.
    pub fn add_result(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        let name = name.into();
        if values.len() != self.x_values.len() {
            return Err(Error::LengthMismatch {
                name,
                len: values.len(),
                expected: self.x_values.len(),
            });
        }
        self.results.insert(name, values);
        Ok(())
    }

    pub fn last_datapoint(&self, name: &str) -> Option<f64> {
        self.results.get(name).and_then(|series| series.last().copied().flatten())
    }

    /// Values of a series. A missing series reads as all nulls.
    pub fn series(&self, name: &str) -> Cow<'_, [Option<f64>]> {
        match self.results.get(name) {
            Some(series) => Cow::Borrowed(series),
            None => {
                warn!(series = name, "missing data points for series");
                Cow::Owned(vec![None; self.x_values.len()])
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.results.contains_key(name)
    }

    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn results(&self) -> &IndexMap<String, Vec<Option<f64>>> {
        &self.results
    }

    pub fn raw_values(&self) -> &IndexMap<String, Vec<RawSample>> {
        &self.raw_values
    }

    pub fn set_raw_values(&mut self, raw_values: IndexMap<String, Vec<RawSample>>) {
        self.raw_values = raw_values;
    }

    pub fn add_raw_values(&mut self, name: impl Into<String>, samples: Vec<RawSample>) {
        self.raw_values.insert(name.into(), samples);
    }

    /// Start of the measurement in seconds since the epoch.
    pub fn t0(&self) -> Option<f64> {
        self.metadata
            .time("T0")
            .or_else(|| self.metadata.time("TIME"))
            .map(|time| epoch_seconds(&time))
    }

    /// `(x, val)` pairs of the raw samples of a series, relative to `T0`
    /// unless `absolute` is set.
    pub fn raw_series(&self, name: &str, absolute: bool) -> Vec<(f64, Option<f64>)> {
        let Some(samples) = self.raw_values.get(name) else {
            warn!(series = name, "missing raw data points for series");
            return Vec::new();
        };
        let offset = if absolute { 0.0 } else { self.t0().unwrap_or_default() };
        samples.iter().map(|sample| (sample.t - offset, sample.value())).collect()
    }

    /// Moving average over a centered window. Nulls stay null and are left
    /// out of their neighbours' windows.
    pub fn smoothed(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
        let window = window.max(1);
        (0..values.len())
            .map(|i| {
                values[i]?;
                let start = i.saturating_sub(window / 2);
                let end = values.len().min(i + window - window / 2);
                let present: Vec<f64> = values[start..end].iter().flatten().copied().collect();
                (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
            })
            .collect()
    }

    /// Rows of `(x, values)`; unknown keys read as null.
    pub fn zipped<'a>(&'a self, keys: &'a [&'a str]) -> impl Iterator<Item = (f64, Vec<Option<f64>>)> + 'a {
        self.x_values.iter().enumerate().map(move |(i, x)| {
            let row = keys
                .iter()
                .map(|key| self.results.get(*key).and_then(|series| series[i]))
                .collect();
            (*x, row)
        })
    }

    /// Append the datapoints of `other` after the last one of this set.
    pub fn concatenate(&mut self, other: &ResultSet) -> Result<()> {
        let Some(&last) = self.x_values.last() else {
            self.create_series(other.series_names());
            for (i, x) in other.x_values.iter().enumerate() {
                self.append_datapoint(*x, other.results.iter().map(|(name, series)| (name.clone(), series[i])))?;
            }
            return Ok(());
        };

        self.create_series(other.series_names());
        let x0 = if self.absolute {
            // Keep a gap between the two runs so they are not drawn joined.
            if let Some(&first) = other.x_values.first() {
                self.append_datapoint::<_, String>((last + first) / 2.0, [])?;
            }
            0.0
        } else {
            last + self.metadata.get_f64("STEP_SIZE").unwrap_or_default()
        };
        for (i, x) in other.x_values.iter().enumerate() {
            self.append_datapoint(x0 + x, other.results.iter().map(|(name, series)| (name.clone(), series[i])))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.x_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_values.is_empty()
    }

    pub fn title(&self) -> String {
        let name = self.metadata.get_str("NAME").unwrap_or_default();
        match self.metadata.get_str("TITLE").filter(|title| !title.is_empty()) {
            Some(title) => format!("{name} - {title}"),
            None => format!("{name} - {}", self.display_time()),
        }
    }

    pub fn label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match self.metadata.get_str("TITLE").filter(|title| !title.is_empty()) {
            Some(title) => title.to_string(),
            None => self.display_time(),
        }
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    fn display_time(&self) -> String {
        self.metadata
            .time("TIME")
            .map(|time| time.format(DISPLAY_TIME_FORMAT).to_string())
            .unwrap_or_default()
    }

    pub fn dump_filename(&self) -> Cow<'_, str> {
        match self.metadata.get_str("DATA_FILENAME") {
            Some(filename) => Cow::Borrowed(filename),
            None => Cow::Owned(self.gen_filename()),
        }
    }

    /// `NAME-<time>[.<title>]<suffix>`, with the title reduced to
    /// `[A-Za-z0-9_]` and cut so the whole name fits the length limit.
    fn gen_filename(&self) -> String {
        let name = self.metadata.get_str("NAME").unwrap_or_default();
        let time = self
            .metadata
            .time("TIME")
            .map(|time| time.format(FILENAME_TIME_FORMAT).to_string())
            .unwrap_or_default();
        let base = format!("{name}-{time}");

        match self.metadata.get_str("TITLE").filter(|title| !title.is_empty()) {
            Some(title) => {
                let budget = MAX_FILENAME_LEN.saturating_sub(base.len() + 1 + self.suffix.len());
                let title: String = title
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .take(budget)
                    .collect();
                format!("{base}.{title}{}", self.suffix)
            }
            None => format!("{base}{}", self.suffix),
        }
    }

    pub fn dumps(&self) -> Result<String> {
        let document = DocumentRef {
            metadata: &self.metadata,
            version: FORMAT_VERSION,
            x_values: &self.x_values,
            results: &self.results,
            raw_values: &self.raw_values,
        };
        serde_json::to_string(&document).map_err(|source| Error::Json { path: None, source })
    }

    /// Write the document to `path`, compressed according to its suffix.
    pub fn dump_file(&self, path: &Path) -> Result<()> {
        let content = self.dumps().map_err(|err| err.with_path(path))?;
        Compression::from_path(path)
            .write(path, content.as_bytes())
            .map_err(|source| Error::Write {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "result set written");
        Ok(())
    }

    /// Write the document into `dir` under its generated file name.
    pub fn dump_dir(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.dump_filename().as_ref());
        self.dump_file(&path)?;
        Ok(path)
    }

    pub fn loads(content: &str) -> Result<Self> {
        Self::from_document(document::parse(content)?, false)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        Self::load(path, false)
    }

    /// Load with x values shifted to absolute epoch seconds.
    pub fn load_file_absolute(path: &Path) -> Result<Self> {
        Self::load(path, true)
    }

    fn load(path: &Path, absolute: bool) -> Result<Self> {
        let content = Compression::from_path(path)
            .read_to_string(path)
            .map_err(|source| Error::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let mut rs = document::parse(&content)
            .and_then(|doc| Self::from_document(doc, absolute))
            .map_err(|err| err.with_path(path))?;
        rs.loaded_from = Some(path.to_path_buf());
        Ok(rs)
    }

    fn from_document(doc: document::Document, absolute: bool) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidDocument { path: None, reason };

        let mut metadata = doc.metadata;
        if metadata.get("TOTAL_LENGTH").is_none() {
            if let Some(max) = doc.x_values.iter().copied().reduce(f64::max) {
                metadata.set("TOTAL_LENGTH", max);
            }
        }
        metadata.normalize_times().map_err(invalid)?;

        let mut rs = match Self::new(metadata) {
            Err(Error::MissingName) => return Err(invalid("missing NAME in metadata".to_string())),
            other => other?,
        };

        let mut x_values = doc.x_values;
        if absolute {
            let x0 = rs
                .t0()
                .ok_or_else(|| invalid("neither T0 nor TIME is set".to_string()))?;
            x_values.iter_mut().for_each(|x| *x += x0);
            rs.absolute = true;
        }
        rs.x_values = x_values;

        for (name, values) in doc.results {
            rs.add_result(name, values).map_err(|err| invalid(err.to_string()))?;
        }
        rs.raw_values = doc.raw_values;
        Ok(rs)
    }
}
