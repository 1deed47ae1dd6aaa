//! End-to-end tests of the `storybatch` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const LOGIN_STORY: &str = "\
Meta: @smoke

Scenario: Log in
Given I am on the login page
When I log in as 'admin'
Then I see the dashboard
";

const SEARCH_STORY: &str = "\
Scenario: Search
Given I am on the main page
When I search for '<term>'
Examples:
|term|
|rust|
|tokio|

Scenario: Unfinished
Meta: @skip
Then nothing happens
";

#[allow(deprecated)]
fn storybatch_cmd() -> Command {
    Command::cargo_bin("storybatch").expect("Failed to find storybatch binary")
}

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("Failed to create dir");
    fs::write(path, content).expect("Failed to write file");
}

/// Two batches over `stories/`: smoke stories first, everything else after.
fn project(runner: &str) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    write(root, "stories/smoke/login.story", LOGIN_STORY);
    write(root, "stories/smoke/fail-logout.story", LOGIN_STORY);
    write(root, "stories/regression/search.story", SEARCH_STORY);
    write(root, "stories/regression/notes.txt", "not a story");
    write(
        root,
        "storybatch.toml",
        &format!(
            r#"
[runner]
threads = 2
story-execution-timeout = "30s"
generate-view-after-batches = true
report-dir = "out"
{runner}

[batch-1]
resource-location = "stories"
resource-include-patterns = "smoke/*.story"
threads = 1

[batch-2]
resource-location = "stories"
resource-include-patterns = ["**/*.story"]
resource-exclude-patterns = "smoke/*.story"

[batch-3]
resource-location = "stories"
resource-include-patterns = "missing/*.story"
"#
        ),
    );
    temp_dir
}

fn config_arg(dir: &TempDir) -> String {
    dir.path().join("storybatch.toml").display().to_string()
}

#[test]
fn test_help_lists_subcommands() {
    storybatch_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_plan_prints_resolved_stories() {
    let dir = project("");
    let output = storybatch_cmd()
        .args(["--config", &config_arg(&dir), "plan"])
        .output()
        .expect("Failed to run storybatch");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "batch-1:");
    assert!(lines[1].ends_with("stories/smoke/fail-logout.story"));
    assert!(lines[2].ends_with("stories/smoke/login.story"));
    assert_eq!(lines[3], "batch-2:");
    assert!(lines[4].ends_with("stories/regression/search.story"));
    assert_eq!(lines[5], "batch-3:");
    assert_eq!(lines[6], "  [no stories found]");
    assert!(!stdout.contains("notes.txt"));
}

#[test]
fn test_dry_run_generates_view_and_events() {
    let dir = project("");
    storybatch_cmd()
        .args(["--config", &config_arg(&dir), "run", "--dry-run"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("batch-1: passed (2 stories)"))
        .stdout(predicate::str::contains("PASSED"));

    let view = fs::read_to_string(dir.path().join("out/view.json")).expect("view.json");
    let view: Value = serde_json::from_str(&view).expect("view json");
    assert_eq!(view["statistics"]["stories"]["passed"], 3);
    // Two login stories with 3 steps each, plus 2 example rows of 2 steps.
    assert_eq!(view["statistics"]["steps"]["not_performed"], 10);

    let events_dir = dir.path().join("out/events");
    let runs: Vec<_> = fs::read_dir(&events_dir)
        .expect("events dir")
        .map(|entry| entry.expect("entry").path())
        .collect();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].join("run.json").exists());
    let log = fs::read_to_string(runs[0].join("events.jsonl")).expect("events");
    assert!(log.lines().next().expect("first").contains("\"run_start\""));
    assert!(log.lines().last().expect("last").contains("\"run_complete\""));
}

#[test]
fn test_failed_batch_stops_run_with_failure_exit() {
    let dir = project(
        r#"story-command = 'case "$STORYBATCH_STORY" in *fail-*) echo "logout failed" >&2; exit 1;; esac; echo "$STORYBATCH_WORKER $STORYBATCH_STORY" >> ran.txt'"#,
    );
    storybatch_cmd()
        .args(["--config", &config_arg(&dir), "run"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stdout(predicate::str::contains("batch-1: failed (2 stories)"))
        .stdout(predicate::str::contains("logout failed"))
        .stdout(predicate::str::contains("batch-2").not());

    let ran = fs::read_to_string(dir.path().join("ran.txt")).expect("ran.txt");
    let lines: Vec<&str> = ran.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("batch-1-thread-1 "));
    assert!(lines[0].ends_with("login.story"));
    assert!(dir.path().join("out/view.json").exists());
}

#[test]
fn test_run_without_story_command_fails() {
    let dir = project("");
    storybatch_cmd()
        .args(["--config", &config_arg(&dir), "run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("story-command"));
}

#[test]
fn test_missing_resource_location_is_reported() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    write(
        temp_dir.path(),
        "storybatch.toml",
        "[batch-1]\nresource-include-patterns = \"*.story\"\n",
    );
    storybatch_cmd()
        .args(["--config", &config_arg(&temp_dir), "plan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "'resource-location' is missing for batch-1",
        ));
}
