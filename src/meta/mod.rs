//! Story and scenario tags, and the filter expressions that select them.
//!
//! A filter is a whitespace-separated list of terms. `+name` requires the
//! tag, `-name` forbids it; a term may be followed by a value, in which case
//! only a tag with that value matches:
//!
//! ```text
//! +smoke -skip +priority 1
//! ```
//!
//! Several filter strings combine with AND.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Errors raised while parsing a meta filter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetaFilterError {
    #[error("meta filter term '{0}' must start with '+' or '-'")]
    MissingOperator(String),

    #[error("meta filter term '{0}' has no tag name")]
    EmptyName(String),
}

/// Tags of a story or scenario, `@name value` in story text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    tags: BTreeMap<String, String>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag; an empty value marks a flag-style tag.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Parses `@name value` declarations, e.g. `@smoke @priority 1`.
    pub fn parse(text: &str) -> Self {
        let mut meta = Self::new();
        for declaration in text.split('@').skip(1) {
            let declaration = declaration.trim();
            let (name, value) = declaration
                .split_once(char::is_whitespace)
                .map(|(n, v)| (n, v.trim()))
                .unwrap_or((declaration, ""));
            if !name.is_empty() {
                meta.tags.insert(name.to_string(), value.to_string());
            }
        }
        meta
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Combines story-level tags with scenario-level tags; the scenario wins.
    pub fn inherit_from(&self, parent: &Meta) -> Meta {
        let mut tags = parent.tags.clone();
        tags.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Meta { tags }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    name: String,
    value: Option<String>,
}

impl Term {
    fn matches(&self, meta: &Meta) -> bool {
        match (&self.value, meta.get(&self.name)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(expected), Some(actual)) => expected == actual,
        }
    }
}

/// Parsed tag filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaFilter {
    include: Vec<Term>,
    exclude: Vec<Term>,
    expressions: Vec<String>,
}

impl MetaFilter {
    /// A filter that allows everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parses a single filter string.
    pub fn parse(expression: &str) -> Result<Self, MetaFilterError> {
        Self::from_filters([expression])
    }

    /// Parses several filter strings and combines them with AND.
    pub fn from_filters<I, S>(filters: I) -> Result<Self, MetaFilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for expression in filters {
            let expression = expression.as_ref().trim();
            if expression.is_empty() {
                continue;
            }
            filter.add_terms(expression)?;
            filter.expressions.push(expression.to_string());
        }
        Ok(filter)
    }

    fn add_terms(&mut self, expression: &str) -> Result<(), MetaFilterError> {
        let mut current: Option<(bool, Term)> = None;
        for token in expression.split_whitespace() {
            let operator = token.chars().next();
            if let Some(op @ ('+' | '-')) = operator {
                self.push(current.take());
                let name = &token[1..];
                if name.is_empty() {
                    return Err(MetaFilterError::EmptyName(token.to_string()));
                }
                let term = Term {
                    name: name.to_string(),
                    value: None,
                };
                current = Some((op == '+', term));
                continue;
            }
            match current.as_mut() {
                Some((_, term)) => {
                    let value = term.value.get_or_insert_with(String::new);
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(token);
                }
                None => return Err(MetaFilterError::MissingOperator(token.to_string())),
            }
        }
        self.push(current);
        Ok(())
    }

    fn push(&mut self, term: Option<(bool, Term)>) {
        match term {
            Some((true, term)) => self.include.push(term),
            Some((false, term)) => self.exclude.push(term),
            None => {}
        }
    }

    /// True when the tags satisfy every include term and no exclude term.
    pub fn allows(&self, meta: &Meta) -> bool {
        self.include.iter().all(|term| term.matches(meta))
            && !self.exclude.iter().any(|term| term.matches(meta))
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

impl fmt::Display for MetaFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expressions.join(" && "))
    }
}
