//! Registry credential sets.
//!
//! Scenarios name a credential set (`correct`, `incorrect`, `empty`,
//! `missing`) rather than a literal token. The two real tokens are loaded
//! once from configuration; the other two sets are fixed.

use std::fmt;
use std::str::FromStr;

/// A named bundle of registry auth, as referenced by a step phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSet {
    Correct,
    Incorrect,
    /// A token that is present but empty.
    Empty,
    /// No token at all; the `token` key is omitted from the request.
    Missing,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown credential set {0:?} (expected correct, incorrect, empty or missing)")]
pub struct CredentialParseError(pub String);

impl FromStr for CredentialSet {
    type Err = CredentialParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correct" => Ok(Self::Correct),
            "incorrect" => Ok(Self::Incorrect),
            "empty" => Ok(Self::Empty),
            "missing" => Ok(Self::Missing),
            other => Err(CredentialParseError(other.to_string())),
        }
    }
}

impl CredentialSet {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::Empty => "empty",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two real registry tokens used by the test run.
#[derive(Clone)]
pub struct Credentials {
    correct: String,
    incorrect: String,
}

impl Credentials {
    pub fn new(correct: impl Into<String>, incorrect: impl Into<String>) -> Self {
        Self {
            correct: correct.into(),
            incorrect: incorrect.into(),
        }
    }

    /// The token with publish rights on the test registry.
    pub fn correct(&self) -> &str {
        &self.correct
    }

    /// Resolve a credential set to the token placed in `source.registry`.
    pub fn token_for(&self, set: CredentialSet) -> Option<String> {
        match set {
            CredentialSet::Correct => Some(self.correct.clone()),
            CredentialSet::Incorrect => Some(self.incorrect.clone()),
            CredentialSet::Empty => Some(String::new()),
            CredentialSet::Missing => None,
        }
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("correct", &"<redacted>")
            .field("incorrect", &"<redacted>")
            .finish()
    }
}
