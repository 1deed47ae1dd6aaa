use crate::config::split_list;
use crate::context::ExampleRow;
use crate::meta::Meta;

const STEP_KEYWORDS: [&str; 4] = ["Given", "When", "Then", "And"];

/// Structure of a story file: tags, given stories and scenarios.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryOutline {
    pub meta: Meta,
    /// Given-story paths, relative to the story's directory.
    pub given_stories: Vec<String>,
    pub scenarios: Vec<ScenarioOutline>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioOutline {
    pub title: String,
    pub meta: Meta,
    pub steps: Vec<String>,
    pub examples: Vec<ExampleRow>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Narrative,
    StoryMeta,
    Scenario,
    ScenarioMeta,
    Examples,
}

#[derive(Default)]
struct ScenarioDraft {
    title: String,
    meta: String,
    steps: Vec<String>,
    header: Option<Vec<String>>,
    examples: Vec<ExampleRow>,
}

impl ScenarioDraft {
    fn finish(self) -> ScenarioOutline {
        ScenarioOutline {
            title: self.title,
            meta: Meta::parse(&self.meta),
            steps: self.steps,
            examples: self.examples,
        }
    }
}

impl StoryOutline {
    /// Parses story text.
    ///
    /// ```text
    /// Meta: @smoke
    /// GivenStories: setup/login.story
    ///
    /// Scenario: Open the main page
    /// Meta: @layout desktop
    /// Given I am on the main page
    /// Then the title is '<title>'
    /// Examples:
    /// |title|
    /// |Home |
    /// ```
    pub fn parse(text: &str) -> Self {
        let mut story_meta = String::new();
        let mut given_stories = Vec::new();
        let mut scenarios: Vec<ScenarioDraft> = Vec::new();
        let mut section = Section::Narrative;

        for line in text.lines().map(str::trim) {
            if line.starts_with("!--") {
                continue;
            }
            if line.is_empty() {
                section = match section {
                    Section::StoryMeta => Section::Narrative,
                    Section::ScenarioMeta => Section::Scenario,
                    other => other,
                };
                continue;
            }
            if let Some(title) = line.strip_prefix("Scenario:") {
                scenarios.push(ScenarioDraft {
                    title: title.trim().to_string(),
                    ..ScenarioDraft::default()
                });
                section = Section::Scenario;
                continue;
            }
            if let Some(rest) = line.strip_prefix("Meta:") {
                section = match scenarios.last_mut() {
                    Some(scenario) => {
                        append(&mut scenario.meta, rest);
                        Section::ScenarioMeta
                    }
                    None => {
                        append(&mut story_meta, rest);
                        Section::StoryMeta
                    }
                };
                continue;
            }
            if let Some(rest) = line.strip_prefix("GivenStories:") {
                given_stories.extend(split_list(rest));
                continue;
            }
            if line.starts_with("Examples:") {
                if let Some(scenario) = scenarios.last_mut() {
                    scenario.header = None;
                    section = Section::Examples;
                }
                continue;
            }

            match (section, scenarios.last_mut()) {
                (Section::StoryMeta, _) if line.starts_with('@') => append(&mut story_meta, line),
                (Section::ScenarioMeta, Some(scenario)) if line.starts_with('@') => {
                    append(&mut scenario.meta, line)
                }
                (Section::Examples, Some(scenario)) if line.starts_with('|') => {
                    let cells = table_cells(line);
                    match &scenario.header {
                        None => scenario.header = Some(cells),
                        Some(header) => scenario
                            .examples
                            .push(header.iter().cloned().zip(cells).collect()),
                    }
                }
                (_, Some(scenario)) if is_step(line) => {
                    scenario.steps.push(line.to_string());
                    section = Section::Scenario;
                }
                _ => {}
            }
        }

        Self {
            meta: Meta::parse(&story_meta),
            given_stories,
            scenarios: scenarios.into_iter().map(ScenarioDraft::finish).collect(),
        }
    }
}

fn append(buffer: &mut String, text: &str) {
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(text.trim());
}

fn is_step(line: &str) -> bool {
    let keyword = line.split_whitespace().next().unwrap_or_default();
    STEP_KEYWORDS.contains(&keyword)
}

fn table_cells(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}
