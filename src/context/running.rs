use std::collections::BTreeMap;

use crate::meta::Meta;
use crate::paths::StoryId;

/// Row of an examples table, column name to cell value.
pub type ExampleRow = BTreeMap<String, String>;

/// Scenario currently executing inside a story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningScenario {
    base_title: String,
    title: String,
    meta: Meta,
    example_index: Option<usize>,
    example: ExampleRow,
}

impl RunningScenario {
    pub fn new(title: impl Into<String>, meta: Meta) -> Self {
        let base_title = title.into();
        Self {
            title: base_title.clone(),
            base_title,
            meta,
            example_index: None,
            example: ExampleRow::new(),
        }
    }

    /// Moves the scenario to an examples-table row.
    ///
    /// `None` means the scenario is not example-driven and keeps its base
    /// title; `Some(i)` suffixes the title with ` [i + 1]`.
    pub fn set_example(&mut self, index: Option<usize>, row: ExampleRow) {
        self.example_index = index;
        self.example = row;
        self.title = match index {
            Some(index) => format!("{} [{}]", self.base_title, index + 1),
            None => self.base_title.clone(),
        };
    }

    /// Display title, including the example row suffix.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn base_title(&self) -> &str {
        &self.base_title
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn example_index(&self) -> Option<usize> {
        self.example_index
    }

    pub fn example(&self) -> &ExampleRow {
        &self.example
    }
}

/// Story on a worker's stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningStory {
    pub id: StoryId,
    /// Nested story run as a precondition of its parent.
    pub given: bool,
    pub excluded: bool,
    pub failed: bool,
    pub scenario: Option<RunningScenario>,
    pub step: Option<String>,
}

impl RunningStory {
    pub fn new(id: StoryId, given: bool) -> Self {
        Self {
            id,
            given,
            excluded: false,
            failed: false,
            scenario: None,
            step: None,
        }
    }
}

/// Decision recorded for a story identity before it is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoryStatus {
    /// Filtered out by the batch meta filter.
    Excluded,
}
