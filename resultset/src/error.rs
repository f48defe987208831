use std::path::{
    Path,
    PathBuf,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Missing name for result set")]
    MissingName,

    #[error("Unexpected data point(s) for undeclared series: {}", .0.join(", "))]
    UnknownSeries(Vec<String>),

    #[error("Series '{name}' has {len} values but the result set has {expected} x values")]
    LengthMismatch { name: String, len: usize, expected: usize },

    #[error("The x values of a result set can only be set once")]
    XValuesAlreadySet,

    #[error(
        "File format version {version}{} is too new, this build supports up to version {supported}. Please upgrade netbench",
        in_path(.path)
    )]
    UnsupportedVersion {
        version: u64,
        supported: u64,
        path: Option<PathBuf>,
    },

    #[error("Unable to load JSON{}: {source}", in_path(.path))]
    Json {
        path: Option<PathBuf>,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid result document{}: {reason}", in_path(.path))]
    InvalidDocument { path: Option<PathBuf>, reason: String },

    #[error("Unable to read input file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to write results data file '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata key not found: {0}")]
    MissingMetadata(String),
}

impl Error {
    /// Attach a file path to document errors that were produced before the
    /// path was known.
    pub(crate) fn with_path(self, path: &Path) -> Self {
        match self {
            Error::UnsupportedVersion { version, supported, .. } => Error::UnsupportedVersion {
                version,
                supported,
                path: Some(path.to_path_buf()),
            },
            Error::Json { source, .. } => Error::Json {
                path: Some(path.to_path_buf()),
                source,
            },
            Error::InvalidDocument { reason, .. } => Error::InvalidDocument {
                path: Some(path.to_path_buf()),
                reason,
            },
            other => other,
        }
    }

    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedVersion { .. } | Error::Json { .. } | Error::InvalidDocument { .. }
        )
    }
}

fn in_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in '{}'", path.display()),
        None => String::new(),
    }
}
