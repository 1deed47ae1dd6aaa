//! Scoped variables shared by the stories of a run.
//!
//! Scopes nest from widest to narrowest:
//! `NextBatches > Batch > Story > Scenario > Step`. Lookups start at the
//! narrowest scope of the asking worker and fall back outwards. Values put
//! into `NextBatches` are not visible in the current batch; they seed the
//! `Batch` scope of every batch that starts afterwards.
//!
//! The bundled runners do not write variables. [`ScopedVariables::put`] and
//! [`ScopedVariables::get`] are library API for custom
//! [`StoryRunner`](crate::runtime::StoryRunner)s, which share the store with
//! the scheduler through
//! [`BatchScheduler::with_variables`](crate::scheduler::BatchScheduler::with_variables).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;

use crate::context::WorkerId;
use crate::reporter::StoryReporter;

/// Lifetime of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VariableScope {
    Step,
    Scenario,
    Story,
    Batch,
    NextBatches,
}

impl VariableScope {
    /// True when `self` is `scope` or nested inside it.
    pub fn is_within(self, scope: VariableScope) -> bool {
        self <= scope
    }
}

impl fmt::Display for VariableScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableScope::Step => "step",
            VariableScope::Scenario => "scenario",
            VariableScope::Story => "story",
            VariableScope::Batch => "batch",
            VariableScope::NextBatches => "next batches",
        };
        f.write_str(name)
    }
}

/// Store whose scopes are cleared at lifecycle boundaries.
pub trait VariableStore: Send + Sync {
    /// Clears `scope` and every narrower scope.
    fn clear_variables(&self, scope: VariableScope);
}

type Variables = HashMap<String, Value>;

#[derive(Debug, Default)]
struct WorkerScopes {
    story: Variables,
    scenario: Variables,
    step: Variables,
}

impl WorkerScopes {
    fn scope_mut(&mut self, scope: VariableScope) -> Option<&mut Variables> {
        match scope {
            VariableScope::Step => Some(&mut self.step),
            VariableScope::Scenario => Some(&mut self.scenario),
            VariableScope::Story => Some(&mut self.story),
            VariableScope::Batch | VariableScope::NextBatches => None,
        }
    }

    fn clear(&mut self, scope: VariableScope) {
        for narrower in [VariableScope::Step, VariableScope::Scenario, VariableScope::Story] {
            if narrower.is_within(scope) {
                if let Some(variables) = self.scope_mut(narrower) {
                    variables.clear();
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.story.is_empty() && self.scenario.is_empty() && self.step.is_empty()
    }
}

#[derive(Debug, Default)]
struct State {
    next_batches: Variables,
    batch: Variables,
    workers: HashMap<WorkerId, WorkerScopes>,
}

/// In-memory [`VariableStore`]. Story, scenario and step scopes are kept per
/// worker so concurrently running stories never see each other's values.
#[derive(Debug, Default)]
pub struct ScopedVariables {
    state: Mutex<State>,
}

impl ScopedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(
        &self,
        worker: &WorkerId,
        scope: VariableScope,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) {
        let name = name.into();
        let value = value.into();
        debug!(worker = %worker, scope = %scope, name = %name, "saving variable");
        let mut state = self.state();
        match scope {
            VariableScope::NextBatches => {
                state.next_batches.insert(name, value);
            }
            VariableScope::Batch => {
                state.batch.insert(name, value);
            }
            narrower => {
                let scopes = state.workers.entry(*worker).or_default();
                if let Some(variables) = scopes.scope_mut(narrower) {
                    variables.insert(name, value);
                }
            }
        }
    }

    /// Looks `name` up from the worker's step scope outwards to the batch
    /// scope.
    pub fn get(&self, worker: &WorkerId, name: &str) -> Option<Value> {
        let state = self.state();
        let worker_value = state.workers.get(worker).and_then(|scopes| {
            scopes
                .step
                .get(name)
                .or_else(|| scopes.scenario.get(name))
                .or_else(|| scopes.story.get(name))
        });
        worker_value.or_else(|| state.batch.get(name)).cloned()
    }

    /// Variables of a single scope. Worker-bound scopes need `worker`.
    pub fn scope(&self, worker: Option<&WorkerId>, scope: VariableScope) -> HashMap<String, Value> {
        let mut state = self.state();
        match scope {
            VariableScope::NextBatches => state.next_batches.clone(),
            VariableScope::Batch => state.batch.clone(),
            narrower => worker
                .and_then(|worker| state.workers.get_mut(worker))
                .and_then(|scopes| scopes.scope_mut(narrower))
                .map(|variables| variables.clone())
                .unwrap_or_default(),
        }
    }

    /// Clears `scope` and every narrower scope of one worker only.
    pub fn clear_worker(&self, worker: &WorkerId, scope: VariableScope) {
        let mut state = self.state();
        if let Some(scopes) = state.workers.get_mut(worker) {
            scopes.clear(scope);
            if scopes.is_empty() {
                state.workers.remove(worker);
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VariableStore for ScopedVariables {
    fn clear_variables(&self, scope: VariableScope) {
        let mut state = self.state();
        for scopes in state.workers.values_mut() {
            scopes.clear(scope);
        }
        state.workers.retain(|_, scopes| !scopes.is_empty());
        if VariableScope::Batch.is_within(scope) {
            state.batch = state.next_batches.clone();
        }
        if scope == VariableScope::NextBatches {
            state.next_batches.clear();
            state.batch.clear();
        }
        debug!(scope = %scope, "cleared variables");
    }
}

/// Reporter clearing the worker-bound scopes as stories, scenarios and
/// steps end.
pub struct VariableScopeReporter {
    variables: Arc<ScopedVariables>,
}

impl VariableScopeReporter {
    pub fn new(variables: Arc<ScopedVariables>) -> Self {
        Self { variables }
    }
}

impl StoryReporter for VariableScopeReporter {
    fn after_story(&self, worker: &WorkerId, given: bool) {
        if !given {
            self.variables.clear_worker(worker, VariableScope::Story);
        }
    }

    fn after_scenario(&self, worker: &WorkerId) {
        self.variables.clear_worker(worker, VariableScope::Scenario);
    }

    fn successful(&self, worker: &WorkerId, _step: &str) {
        self.variables.clear_worker(worker, VariableScope::Step);
    }

    fn failed(&self, worker: &WorkerId, _step: &str, _cause: &str) {
        self.variables.clear_worker(worker, VariableScope::Step);
    }

    fn not_performed(&self, worker: &WorkerId, _step: &str) {
        self.variables.clear_worker(worker, VariableScope::Step);
    }
}
