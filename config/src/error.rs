pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("Invalid run configuration: {0}")]
    Invalid(String),

    #[error("Worker name '{0}' is used more than once")]
    DuplicateWorker(String),

    #[error("Worker '{worker}' has {field} = '{target}', which is not another configured worker")]
    UnknownReference {
        worker: String,
        field: &'static str,
        target: String,
    },

    #[error("Workers wait for each other in a loop: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Worker '{0}' runs a process but has no command")]
    MissingCommand(String),
}
