use super::{
    Job,
    JobContext,
};
use crate::output::WorkerOutput;

/// Placeholder that does nothing and is not expected to produce data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJob;

impl Job for NullJob {
    fn describe(&self) -> String {
        "null".to_string()
    }

    async fn run(self, _ctx: JobContext) -> WorkerOutput {
        WorkerOutput::silent()
    }
}
