//! Gating of suite-wide before/after hooks across batches.
//!
//! Suite hooks run once per run: the before-hooks with the first batch, the
//! after-hooks with the last batch. When a batch fails and failures are not
//! ignored, the run stops after that batch, so its teardown runs the
//! after-hooks instead.

use std::fmt;

/// Place of a batch in the ordered registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPosition {
    /// Zero-based index.
    pub index: usize,
    pub total: usize,
}

impl BatchPosition {
    pub fn new(index: usize, total: usize) -> Self {
        Self { index, total }
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total
    }
}

/// Pure decisions about suite hook execution.
pub struct LifecycleGate;

impl LifecycleGate {
    pub fn should_run_before_hooks(position: BatchPosition) -> bool {
        position.is_first()
    }

    pub fn should_run_after_hooks(
        position: BatchPosition,
        accumulated_failures: usize,
        ignore_failures: bool,
    ) -> bool {
        position.is_last() || (accumulated_failures > 0 && !ignore_failures)
    }

    /// Lifecycle flags handed to the execution runtime for one batch.
    pub fn lifecycle(position: BatchPosition, ignore_failures: bool) -> BatchLifecycle {
        BatchLifecycle {
            report_before: Self::should_run_before_hooks(position),
            report_after: position.is_last(),
            ignore_failures,
        }
    }
}

/// Per-batch lifecycle flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchLifecycle {
    pub report_before: bool,
    /// Set for the last batch; failures can still enable the after-hooks.
    pub report_after: bool,
    pub ignore_failures: bool,
}

impl BatchLifecycle {
    /// Decides the after-hooks at teardown, once the batch's failure count
    /// is known.
    pub fn should_run_after(&self, failures: usize) -> bool {
        self.report_after || (failures > 0 && !self.ignore_failures)
    }
}

/// Suite hook stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Before,
    After,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Before => f.write_str("BEFORE"),
            Stage::After => f.write_str("AFTER"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_before_hooks_only_for_first_batch() {
        assert!(LifecycleGate::should_run_before_hooks(BatchPosition::new(0, 3)));
        assert!(!LifecycleGate::should_run_before_hooks(BatchPosition::new(1, 3)));
        assert!(!LifecycleGate::should_run_before_hooks(BatchPosition::new(2, 3)));
    }

    #[test]
    fn test_after_hooks_for_last_batch() {
        assert!(!LifecycleGate::should_run_after_hooks(BatchPosition::new(0, 3), 0, false));
        assert!(!LifecycleGate::should_run_after_hooks(BatchPosition::new(1, 3), 0, false));
        assert!(LifecycleGate::should_run_after_hooks(BatchPosition::new(2, 3), 0, false));
        assert!(LifecycleGate::should_run_after_hooks(BatchPosition::new(2, 3), 4, true));
    }

    #[test]
    fn test_after_hooks_when_failing_batch_stops_run() {
        let first = BatchPosition::new(0, 3);
        assert!(LifecycleGate::should_run_after_hooks(first, 1, false));
        assert!(!LifecycleGate::should_run_after_hooks(first, 1, true));
    }

    #[test]
    fn test_single_batch_is_first_and_last() {
        let only = BatchPosition::new(0, 1);
        let lifecycle = LifecycleGate::lifecycle(only, false);
        assert!(lifecycle.report_before);
        assert!(lifecycle.report_after);
    }

    #[test]
    fn test_lifecycle_matches_gate_at_teardown() {
        for total in 1..4 {
            for index in 0..total {
                for ignore in [false, true] {
                    for failures in [0, 2] {
                        let position = BatchPosition::new(index, total);
                        let lifecycle = LifecycleGate::lifecycle(position, ignore);
                        assert_eq!(
                            lifecycle.should_run_after(failures),
                            LifecycleGate::should_run_after_hooks(position, failures, ignore)
                        );
                        assert_eq!(
                            lifecycle.report_before,
                            LifecycleGate::should_run_before_hooks(position)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Before.to_string(), "BEFORE");
        assert_eq!(Stage::After.to_string(), "AFTER");
    }
}
