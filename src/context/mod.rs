//! Run context: the queryable record of what is currently executing.

mod run_context;
mod running;
mod worker;

pub use run_context::RunContext;
pub use running::{ExampleRow, RunningScenario, RunningStory, StoryStatus};
pub use worker::WorkerId;
