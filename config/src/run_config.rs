use crate::{
    find_run_after_cycle,
    user_config_file,
    AggregatorKind,
    Error,
    Result,
    RunArgs,
    WorkerSpec,
    DEFAULT_KIND,
};
use indexmap::IndexMap;
use netbench_resultset::Metadata;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    json,
    Value,
};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    time::Duration,
};

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

/// Immutable settings of one measurement run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_host: Option<String>,
    /// Seconds.
    pub length: f64,
    /// Seconds between two points of the aligned time series.
    pub step_size: f64,
    pub iterations: usize,
    #[serde(default)]
    pub aggregator: AggregatorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_version: Option<u8>,
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Worker index to ssh host. Keys are indices as strings.
    #[serde(default)]
    pub remote_hosts: BTreeMap<String, String>,
    #[serde(default)]
    pub test_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub workers: IndexMap<String, WorkerSpec>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            title: None,
            note: None,
            hosts: Vec::new(),
            local_host: None,
            length: 60.0,
            step_size: 0.2,
            iterations: 1,
            aggregator: AggregatorKind::default(),
            ip_version: None,
            output_dir: PathBuf::from("."),
            log_file: None,
            remote_hosts: BTreeMap::new(),
            test_parameters: BTreeMap::new(),
            workers: IndexMap::new(),
        }
    }
}

impl RunConfig {
    /// Load the layered configuration: built-in defaults, the user's
    /// `config.yaml`, the run file and finally command line flags.
    #[instrument(level = "debug", skip(args), fields(run_file = %args.run_file.display()))]
    pub fn load(args: &RunArgs) -> Result<Self> {
        let cfg: Self = Self::builder()
            .add_source(
                config::File::from(user_config_file())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::File::from(args.run_file.clone())
                    .format(config::FileFormat::Yaml)
                    .required(true),
            )
            .add_source(args.clone())
            .build()?
            .try_deserialize()?;
        cfg.finalize()
    }

    /// Built-in defaults overlaid with a run file given as a string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let cfg: Self = Self::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        cfg.finalize()
    }

    fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder().add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml))
    }

    /// Expand duplicates, assign indices and remote hosts, then validate.
    pub fn finalize(mut self) -> Result<Self> {
        let declared = std::mem::take(&mut self.workers);
        for (name, spec) in declared {
            for mut spec in spec.expand(&name) {
                spec.idx = self.workers.len();
                if spec.remote_host.is_none() {
                    spec.remote_host = self.remote_hosts.get(&spec.idx.to_string()).cloned();
                }
                if self.workers.contains_key(&spec.name) {
                    return Err(Error::DuplicateWorker(spec.name));
                }
                self.workers.insert(spec.name.clone(), spec);
            }
        }
        self.validate()?;
        debug!(name = %self.name, workers = self.workers.len(), "run configuration loaded");
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Invalid("a test name is required".to_string()));
        }
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(Error::Invalid(format!("step size must be positive, got {}", self.step_size)));
        }
        if !(self.length.is_finite() && self.length >= 0.0) {
            return Err(Error::Invalid(format!("length must not be negative, got {}", self.length)));
        }
        if self.iterations == 0 {
            return Err(Error::Invalid("at least one iteration is required".to_string()));
        }
        if self.workers.is_empty() {
            return Err(Error::Invalid("no workers configured".to_string()));
        }
        for (name, spec) in &self.workers {
            for (field, target) in [("run_after", &spec.run_after), ("kill_after", &spec.kill_after)] {
                let Some(target) = target else {
                    continue;
                };
                if target == name || !self.workers.contains_key(target) {
                    return Err(Error::UnknownReference {
                        worker: name.clone(),
                        field,
                        target: target.clone(),
                    });
                }
            }
            if spec.kind == DEFAULT_KIND && spec.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                return Err(Error::MissingCommand(name.clone()));
            }
        }
        if let Some(cycle) = find_run_after_cycle(&self.workers) {
            return Err(Error::DependencyCycle(cycle));
        }
        Ok(())
    }

    pub fn step(&self) -> Duration {
        Duration::try_from_secs_f64(self.step_size).unwrap_or_default()
    }

    pub fn length(&self) -> Duration {
        Duration::try_from_secs_f64(self.length).unwrap_or_default()
    }

    /// Length including the longest worker delay.
    pub fn total_length(&self) -> f64 {
        let delay = self.workers.values().map(|spec| spec.delay).fold(0.0, f64::max);
        self.length + delay
    }

    pub fn local_host(&self) -> Option<String> {
        self.local_host
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|host| !host.is_empty())
    }

    /// Run settings recorded in the metadata of a new result set.
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.set("NAME", self.name.clone());
        metadata.set("HOST", self.hosts.first().cloned().map_or(Value::Null, Value::from));
        metadata.set("HOSTS", self.hosts.clone());
        metadata.set("LOCAL_HOST", self.local_host().map_or(Value::Null, Value::from));
        metadata.set("TITLE", self.title.clone().map_or(Value::Null, Value::from));
        metadata.set("NOTE", self.note.clone().map_or(Value::Null, Value::from));
        metadata.set("LENGTH", self.length);
        metadata.set("TOTAL_LENGTH", self.total_length());
        metadata.set("STEP_SIZE", self.step_size);
        metadata.set("TEST_PARAMETERS", json!(self.test_parameters));
        metadata.set("TOOL_VERSION", env!("CARGO_PKG_VERSION"));
        metadata.set("IP_VERSION", self.ip_version.map_or(Value::Null, Value::from));
        metadata.set("ITERATIONS", self.iterations);
        metadata.set("AGGREGATOR", self.aggregator.to_string());
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParserKind;
    use netbench_resultset::{
        DataTransform,
        RECORDED_SETTINGS,
    };
    use pretty_assertions::assert_eq;
    use temp_dir::TempDir;

    const RUN_FILE: &str = r#"
name: rrul-lite
hosts: [server.example]
length: 30
remote_hosts:
  "2": user@box
test_parameters:
  qdisc: fq_codel
workers:
  ping:
    command: "ping -D -i 0.2 -w 30 server.example"
    parser: pairs
    data_transform: [s_to_ms]
    units: ms
  tcp:
    command: "netperf -H server.example"
    duplicates: 2
    run_after: ping
  avg:
    kind: average
    apply_to: ["tcp::*"]
"#;

    #[test]
    fn default_yaml_matches_default() {
        let parsed: RunConfig = serde_yml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, RunConfig::default());
    }

    #[test]
    fn run_file_overlays_defaults() {
        let cfg = RunConfig::from_yaml(RUN_FILE).unwrap();
        assert_eq!(cfg.name, "rrul-lite");
        assert_eq!(cfg.length, 30.0);
        assert_eq!(cfg.step_size, 0.2);
        assert_eq!(cfg.aggregator, AggregatorKind::Timeseries);

        let ping = &cfg.workers["ping"];
        assert_eq!(ping.parser, ParserKind::Pairs);
        assert_eq!(ping.data_transform, vec![DataTransform::SToMs]);
        assert_eq!(ping.kind, DEFAULT_KIND);
    }

    #[test]
    fn duplicates_expand_in_declaration_order() {
        let cfg = RunConfig::from_yaml(RUN_FILE).unwrap();
        let names: Vec<_> = cfg.workers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["ping", "tcp::1", "tcp::2", "avg"]);
        let indices: Vec<_> = cfg.workers.values().map(|spec| spec.idx).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(cfg.workers["tcp::2"].remote_host.as_deref(), Some("user@box"));
        assert_eq!(cfg.workers["tcp::1"].remote_host, None);
        assert_eq!(cfg.workers["tcp::1"].run_after.as_deref(), Some("ping"));
    }

    #[test]
    fn unknown_references_are_rejected() {
        let err = RunConfig::from_yaml(
            r#"
name: x
workers:
  a: {command: "true", run_after: b}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownReference { ref target, .. } if target == "b"), "{err}");

        let err = RunConfig::from_yaml(
            r#"
name: x
workers:
  a: {command: "true", kill_after: a}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownReference { .. }), "{err}");
    }

    #[test]
    fn run_after_loops_are_rejected() {
        let err = RunConfig::from_yaml(
            r#"
name: x
workers:
  a: {command: "true", run_after: b}
  b: {command: "true", run_after: a}
"#,
        )
        .unwrap_err();
        assert!(
            matches!(err, Error::DependencyCycle(ref cycle) if cycle == &["a", "b", "a"]),
            "{err}"
        );
        assert_eq!(err.to_string(), "Workers wait for each other in a loop: a -> b -> a");
    }

    #[test]
    fn process_workers_need_a_command() {
        let err = RunConfig::from_yaml("name: x\nworkers:\n  a: {parser: pairs}\n").unwrap_err();
        assert!(matches!(err, Error::MissingCommand(ref name) if name == "a"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(RunConfig::from_yaml("workers:\n  a: {command: x}\n").is_err());
        assert!(RunConfig::from_yaml("name: x\nstep_size: 0\nworkers:\n  a: {command: x}\n").is_err());
        assert!(RunConfig::from_yaml("name: x\niterations: 0\nworkers:\n  a: {command: x}\n").is_err());
        assert!(RunConfig::from_yaml("name: x\n").is_err());
    }

    #[test]
    fn command_line_overrides_run_file() {
        let dir = TempDir::new().unwrap();
        let run_file = dir.path().join("rrul.yaml");
        std::fs::write(&run_file, RUN_FILE).unwrap();
        let args = RunArgs {
            run_file,
            length: Some(10.0),
            title: Some("lab".to_string()),
            test_parameters: vec!["bw=100mbit".to_string()],
            ..RunArgs::default()
        };
        let cfg = RunConfig::load(&args).unwrap();
        assert_eq!(cfg.length, 10.0);
        assert_eq!(cfg.title.as_deref(), Some("lab"));
        assert_eq!(cfg.test_parameters["qdisc"], "fq_codel");
        assert_eq!(cfg.test_parameters["bw"], "100mbit");
        assert_eq!(cfg.workers.len(), 4);
    }

    #[test]
    fn metadata_records_run_settings() {
        let mut cfg = RunConfig::from_yaml(RUN_FILE).unwrap();
        cfg.local_host = Some("client".to_string());
        let metadata = cfg.to_metadata();
        assert_eq!(metadata.get_str("NAME"), Some("rrul-lite"));
        assert_eq!(metadata.get_str("HOST"), Some("server.example"));
        assert_eq!(metadata.get_str("LOCAL_HOST"), Some("client"));
        assert_eq!(metadata.get_f64("STEP_SIZE"), Some(0.2));
        assert_eq!(metadata.lookup("TEST_PARAMETERS:qdisc"), Some(&json!("fq_codel")));
        assert_eq!(metadata.get_str("AGGREGATOR"), Some("timeseries"));
        for key in metadata.keys() {
            assert!(RECORDED_SETTINGS.contains(&key.as_str()), "{key}");
        }
    }
}
