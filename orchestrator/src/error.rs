use netbench_resultset::TransformError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}. Run with --log-file and check the debug log to investigate")]
    Aggregation(String),

    #[error("Unable to transform the output of '{series}': {source}")]
    Transform {
        series: String,
        #[source]
        source: TransformError,
    },

    #[error("Postprocessor '{name}' failed: {reason}")]
    Postprocessor { name: String, reason: String },

    #[error("Interrupted, all workers were killed")]
    Interrupted,

    #[error(transparent)]
    Config(#[from] netbench_config::Error),

    #[error(transparent)]
    ResultSet(#[from] netbench_resultset::Error),
}

impl Error {
    pub(crate) fn no_data() -> Self {
        Error::Aggregation("No data to aggregate".to_string())
    }
}
