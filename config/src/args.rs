use crate::AggregatorKind;
use clap::Parser;
use std::path::PathBuf;

/// Settings of a single measurement run.
#[derive(Parser, Debug, Clone, Default)]
pub struct RunArgs {
    /// Run file (yaml) declaring the workers of the test.
    #[clap(value_name = "RUN_FILE")]
    pub run_file: PathBuf,

    /// Override the test name.
    #[clap(long)]
    pub name: Option<String>,

    /// Title recorded with the results and used in the file name.
    #[clap(short = 't', long)]
    pub title: Option<String>,

    /// Free-form note recorded with the results.
    #[clap(long)]
    pub note: Option<String>,

    /// Target host. Can be given several times.
    #[clap(short = 'H', long = "host", value_name = "HOST")]
    pub hosts: Vec<String>,

    /// Test length in seconds.
    #[clap(short = 'l', long)]
    pub length: Option<f64>,

    /// Resolution of the time series in seconds.
    #[clap(short = 's', long)]
    pub step_size: Option<f64>,

    /// Number of runs for the iteration aggregator.
    #[clap(short = 'n', long)]
    pub iterations: Option<usize>,

    #[clap(long)]
    pub aggregator: Option<AggregatorKind>,

    /// IP version recorded with the results (4 or 6).
    #[clap(long, value_parser = clap::value_parser!(u8).range(4..=6))]
    pub ip_version: Option<u8>,

    /// Directory the result file is written to.
    #[clap(short = 'D', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Write a debug log of every worker's invocation and output to FILE.
    #[clap(short = 'L', long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Extra test parameter recorded in the metadata, as KEY=VALUE.
    #[clap(long = "test-parameter", value_name = "KEY=VALUE")]
    pub test_parameters: Vec<String>,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };

    impl Source for RunArgs {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = Map::<String, Value>::new();
            if let Some(name) = &self.name {
                cache.insert("name".to_string(), name.clone().into());
            }
            if let Some(title) = &self.title {
                cache.insert("title".to_string(), title.clone().into());
            }
            if let Some(note) = &self.note {
                cache.insert("note".to_string(), note.clone().into());
            }
            if !self.hosts.is_empty() {
                cache.insert("hosts".to_string(), self.hosts.clone().into());
            }
            if let Some(length) = self.length {
                cache.insert("length".to_string(), length.into());
            }
            if let Some(step_size) = self.step_size {
                cache.insert("step_size".to_string(), step_size.into());
            }
            if let Some(iterations) = self.iterations {
                cache.insert("iterations".to_string(), (iterations as u64).into());
            }
            if let Some(aggregator) = self.aggregator {
                cache.insert("aggregator".to_string(), aggregator.to_string().into());
            }
            if let Some(ip_version) = self.ip_version {
                cache.insert("ip_version".to_string(), u64::from(ip_version).into());
            }
            if let Some(dir) = &self.output_dir {
                cache.insert("output_dir".to_string(), dir.display().to_string().into());
            }
            if let Some(file) = &self.log_file {
                cache.insert("log_file".to_string(), file.display().to_string().into());
            }
            for parameter in &self.test_parameters {
                let Some((key, value)) = parameter.split_once('=') else {
                    return Err(config::ConfigError::Message(format!(
                        "test parameter '{parameter}' is not of the form KEY=VALUE"
                    )));
                };
                cache.insert(format!("test_parameters.{}", key.trim()), value.trim().to_string().into());
            }
            Ok(cache)
        }
    }
}
