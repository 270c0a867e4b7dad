//! Feature files.
//!
//! Scenarios are written in a small Gherkin subset:
//!
//! ```text
//! @smoke
//! Feature: check
//!   Free-form description.
//!
//!   Background:
//!     Given a source configuration for package "left-pad"
//!
//!   Scenario: latest version is reported
//!     When the resource is checked
//!     Then version "1.3.0" is returned
//! ```
//!
//! Supported: `Feature:`, one optional `Background:`, `Scenario:` (or
//! `Example:`), steps introduced by `Given`, `When`, `Then`, `And`, `But`
//! or `*`, `@tag` lines, `#` comments and blank lines. Background steps are
//! prepended to every scenario.

pub mod step;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

pub use step::{Step, StepParseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    /// Tags without the leading `@`, including the feature's tags.
    pub tags: Vec<String>,
    pub steps: Vec<ScenarioStep>,
}

/// A parsed step together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioStep {
    pub keyword: Keyword,
    #[serde(serialize_with = "serialize_display")]
    pub step: Step,
    /// 1-based line in the feature file.
    pub line: usize,
}

fn serialize_display<S: serde::Serializer>(step: &Step, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(step)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Keyword {
    Given,
    When,
    Then,
    And,
    But,
    #[serde(rename = "*")]
    Star,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Given => "Given",
            Self::When => "When",
            Self::Then => "Then",
            Self::And => "And",
            Self::But => "But",
            Self::Star => "*",
        }
    }

    /// Split a step line into its keyword and phrase.
    fn split(line: &str) -> Option<(Self, &str)> {
        const KEYWORDS: [(&str, Keyword); 6] = [
            ("Given ", Keyword::Given),
            ("When ", Keyword::When),
            ("Then ", Keyword::Then),
            ("And ", Keyword::And),
            ("But ", Keyword::But),
            ("* ", Keyword::Star),
        ];
        KEYWORDS
            .iter()
            .find_map(|(prefix, kw)| line.strip_prefix(prefix).map(|rest| (*kw, rest.trim())))
    }
}

impl std::fmt::Display for ScenarioStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.keyword.as_str(), self.step)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeatureParseError {
    #[error("line {line}: {source}")]
    Step {
        line: usize,
        #[source]
        source: StepParseError,
    },

    #[error("line {line}: step outside of a Background or Scenario")]
    OrphanStep { line: usize },

    #[error("line {line}: expected `Feature:` before {found:?}")]
    MissingFeature { line: usize, found: String },

    #[error("line {line}: only one Feature per file is supported")]
    DuplicateFeature { line: usize },

    #[error("line {line}: Background must come before the first Scenario")]
    LateBackground { line: usize },

    #[error("line {line}: {construct} is not supported")]
    Unsupported {
        line: usize,
        construct: &'static str,
    },

    #[error("line {line}: unrecognized line {text:?}")]
    Unrecognized { line: usize, text: String },

    #[error("no `Feature:` found")]
    Empty,
}

/// Where the parser currently is in the file.
enum Block {
    /// Before `Feature:`.
    Preamble,
    /// After `Feature:`, before any Background or Scenario.
    Description,
    Background,
    Scenario,
}

impl Feature {
    /// Parse feature-file text.
    pub fn parse(text: &str) -> Result<Self, FeatureParseError> {
        let mut name: Option<String> = None;
        let mut feature_tags: Vec<String> = Vec::new();
        let mut pending_tags: Vec<String> = Vec::new();
        let mut background: Vec<ScenarioStep> = Vec::new();
        let mut scenarios: Vec<Scenario> = Vec::new();
        let mut block = Block::Preamble;

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if trimmed.starts_with('@') {
                pending_tags.extend(
                    trimmed
                        .split_whitespace()
                        .filter_map(|t| t.strip_prefix('@'))
                        .map(str::to_string),
                );
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix("Feature:") {
                if name.is_some() {
                    return Err(FeatureParseError::DuplicateFeature { line });
                }
                name = Some(rest.trim().to_string());
                feature_tags = std::mem::take(&mut pending_tags);
                block = Block::Description;
                continue;
            }

            if matches!(block, Block::Preamble) {
                return Err(FeatureParseError::MissingFeature {
                    line,
                    found: trimmed.to_string(),
                });
            }

            if trimmed.starts_with("Background:") {
                if !scenarios.is_empty() || matches!(block, Block::Background) {
                    return Err(FeatureParseError::LateBackground { line });
                }
                block = Block::Background;
                continue;
            }

            if trimmed.starts_with("Scenario Outline:") || trimmed.starts_with("Scenario Template:")
            {
                return Err(FeatureParseError::Unsupported {
                    line,
                    construct: "Scenario Outline",
                });
            }

            let scenario_name = trimmed
                .strip_prefix("Scenario:")
                .or_else(|| trimmed.strip_prefix("Example:"));
            if let Some(rest) = scenario_name {
                let mut tags = feature_tags.clone();
                tags.append(&mut pending_tags);
                scenarios.push(Scenario {
                    name: rest.trim().to_string(),
                    tags,
                    steps: background.clone(),
                });
                block = Block::Scenario;
                continue;
            }

            if trimmed.starts_with("\"\"\"") || trimmed.starts_with("```") {
                return Err(FeatureParseError::Unsupported {
                    line,
                    construct: "doc string",
                });
            }
            if trimmed.starts_with('|') {
                return Err(FeatureParseError::Unsupported {
                    line,
                    construct: "data table",
                });
            }

            if let Some((keyword, phrase)) = Keyword::split(trimmed) {
                let step = Step::parse(phrase)
                    .map_err(|source| FeatureParseError::Step { line, source })?;
                let step = ScenarioStep {
                    keyword,
                    step,
                    line,
                };
                match block {
                    Block::Background => background.push(step),
                    Block::Scenario => {
                        if let Some(scenario) = scenarios.last_mut() {
                            scenario.steps.push(step);
                        }
                    }
                    Block::Preamble | Block::Description => {
                        return Err(FeatureParseError::OrphanStep { line });
                    }
                }
                continue;
            }

            match block {
                // Free-form description text.
                Block::Description => continue,
                _ => {
                    return Err(FeatureParseError::Unrecognized {
                        line,
                        text: trimmed.to_string(),
                    });
                }
            }
        }

        let name = name.ok_or(FeatureParseError::Empty)?;
        Ok(Self { name, scenarios })
    }

    /// Read and parse a feature file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read feature file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}
