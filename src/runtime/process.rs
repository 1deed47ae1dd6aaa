use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::outline::StoryOutline;
use super::{RuntimeError, RuntimeResult, StoryError, StoryRun, StoryRunner};
use crate::meta::Meta;
use crate::paths::StoryId;

/// Environment variable holding the story identifier.
pub const STORY_ENV: &str = "STORYBATCH_STORY";
/// Environment variable holding the batch key.
pub const BATCH_ENV: &str = "STORYBATCH_BATCH";
/// Environment variable holding the worker identity.
pub const WORKER_ENV: &str = "STORYBATCH_WORKER";
/// Environment variable holding the batch meta filter.
pub const META_FILTER_ENV: &str = "STORYBATCH_META_FILTER";

const STDERR_TAIL_LINES: usize = 20;

/// Executes each story with a shell command.
///
/// The command runs through `sh -c` with the story described in its
/// environment. A non-zero exit fails the story. The child is killed when
/// the story is abandoned, for example on timeout.
#[derive(Debug, Clone)]
pub struct ProcessStoryRunner {
    command: String,
    working_dir: Option<PathBuf>,
}

impl ProcessStoryRunner {
    pub fn new(command: impl Into<String>) -> RuntimeResult<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(RuntimeError::EmptyCommand);
        }
        Ok(Self {
            command,
            working_dir: None,
        })
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl StoryRunner for ProcessStoryRunner {
    async fn story_meta(&self, story: &StoryId) -> Result<Meta, StoryError> {
        let text = tokio::fs::read_to_string(story.as_path()).await?;
        Ok(StoryOutline::parse(&text).meta)
    }

    async fn run_story(&self, run: StoryRun<'_>) -> Result<(), StoryError> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .env(STORY_ENV, run.story.as_str())
            .env(BATCH_ENV, run.worker.batch.to_string())
            .env(WORKER_ENV, run.worker.to_string())
            .env(META_FILTER_ENV, run.meta_filter.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        run.reporter.before_step(&run.worker, &self.command);
        let output = match command.output().await {
            Ok(output) => output,
            Err(err) => {
                run.reporter
                    .failed(&run.worker, &self.command, &err.to_string());
                return Err(StoryError::Io(err));
            }
        };
        debug!(
            worker = %run.worker,
            story = %run.story,
            status = %output.status,
            stdout_bytes = output.stdout.len(),
            "story command finished"
        );

        if output.status.success() {
            run.reporter.successful(&run.worker, &self.command);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        let cause = if tail.is_empty() {
            format!("command exited with {}", output.status)
        } else {
            format!("command exited with {}: {}", output.status, tail)
        };
        run.reporter.failed(&run.worker, &self.command, &cause);
        Err(StoryError::Failed(cause))
    }
}
