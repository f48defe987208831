#[macro_use]
extern crate tracing;

mod app;
pub mod args;
mod errors;
mod logging;

pub use app::App;
pub use args::{
    Cli,
    Command,
};
pub use errors::init_errors;
pub use logging::init_logging;
