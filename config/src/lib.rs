//! Run configuration of netbench: what to measure, how long, and which
//! workers take part.

#[macro_use]
extern crate tracing;

mod args;
mod error;
mod kinds;
mod run_config;
mod user_config;
mod worker_spec;

pub use args::RunArgs;
pub use error::{
    Error,
    Result,
};
pub use kinds::{
    AggregatorKind,
    AggregatorKindIter,
    ParserKind,
    ParserKindIter,
};
pub use run_config::RunConfig;
pub use user_config::{
    config_dir,
    user_config_file,
    CONFIG_DIR_ENV,
    USER_CONFIG_FILE,
};
pub use worker_spec::{
    find_run_after_cycle,
    WorkerSpec,
    DEFAULT_KIND,
    DEFAULT_SMOOTH_STEPS,
    DUPLICATE_SEPARATOR,
};
