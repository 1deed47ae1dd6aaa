//! Batch orchestrator for large suites of story tests.
//!
//! Stories are grouped into numbered batches. Batches run one after another,
//! each on its own bounded worker pool with its own timeout, meta filter and
//! failure policy. Suite hooks fire once per run, with the first batch and
//! with the batch that ends the run.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use storybatch::config::Configuration;
//! use storybatch::context::RunContext;
//! use storybatch::paths::PathResolver;
//! use storybatch::reporter::{LoggingReporter, RunContextReporter};
//! use storybatch::runtime::{ProcessStoryRunner, StoryManager};
//! use storybatch::scheduler::BatchScheduler;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let configuration = Configuration::load(Some("storybatch.toml".as_ref()))?;
//! let batches = PathResolver::new(&configuration.base_dir).find_all(&configuration.registry)?;
//!
//! let context = Arc::new(RunContext::new());
//! let reporter = RunContextReporter::new(context.clone()).with_next(Arc::new(LoggingReporter));
//! let runner = ProcessStoryRunner::new("./run-story.sh")?;
//! let runtime = StoryManager::new(runner, Arc::new(reporter), context.clone());
//!
//! let summary = BatchScheduler::new(
//!     configuration.registry,
//!     configuration.settings,
//!     Arc::new(runtime),
//!     context,
//! )
//! .run_batches(&batches)
//! .await?;
//! println!("{} failed stories", summary.failure_count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod lifecycle;
pub mod meta;
pub mod parallel;
pub mod paths;
pub mod report;
pub mod reporter;
pub mod runtime;
pub mod scheduler;
pub mod variables;
