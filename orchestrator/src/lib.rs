//! # Orchestrator
//!
//! Runs the configured workers concurrently, honors their start and kill
//! dependencies, reacts to graceful and hard shutdown requests and turns
//! what the workers produced into a [`netbench_resultset::ResultSet`].

#[macro_use]
extern crate tracing;

pub mod aggregator;
mod error;
mod output;
mod registry;
mod run;
mod shutdown;
mod signal;
mod supervisor;
mod transform;
pub mod worker;

pub use error::{
    Error,
    Result,
};
pub use output::{
    Diagnostics,
    Measurement,
    Postprocessor,
    WorkerOutput,
    WorkerResult,
};
pub use registry::{
    WorkerFactory,
    WorkerRegistry,
};
pub use run::run_test;
pub use shutdown::Shutdown;
pub use signal::Signal;
pub use supervisor::{
    Collected,
    Supervisor,
    POLL_INTERVAL,
};
