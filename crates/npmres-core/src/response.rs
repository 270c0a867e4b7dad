//! Captured result of one resource invocation.

use serde::{Deserialize, Serialize};

use crate::assertions::AssertionError;

/// Exit status and raw output of a resource process.
///
/// The runner does not interpret the output; a non-zero exit is a valid
/// outcome that assertions may check for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceResponse {
    /// The exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
}

/// The version reported on stdout, decoded from one of the two shapes a
/// resource emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionOutput {
    /// `in` / `out`: `{"version": {"version": "1.2.3"}, "metadata": [...]}`.
    Single(String),
    /// `check`: `[{"version": "1.2.3"}, ...]`. Holds the first element's
    /// version, if the list is non-empty.
    List(Option<String>),
}

impl VersionOutput {
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Single(v) => Some(v),
            Self::List(first) => first.as_deref(),
        }
    }
}

#[derive(Deserialize)]
struct VersionEntry {
    version: String,
}

#[derive(Deserialize)]
struct SingleOutput {
    version: VersionEntry,
}

/// Only the first element of a `check` list is read, so the rest are kept
/// undecoded.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawOutput {
    List(Vec<serde_json::Value>),
    Single(SingleOutput),
}

impl ResourceResponse {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Parse stdout into a [`VersionOutput`].
    pub fn version_output(&self) -> Result<VersionOutput, AssertionError> {
        let raw: RawOutput =
            serde_json::from_str(&self.stdout).map_err(|e| AssertionError::MalformedOutput {
                reason: e.to_string(),
                stdout: self.stdout.clone(),
            })?;
        Ok(match raw {
            RawOutput::List(entries) => VersionOutput::List(
                entries
                    .first()
                    .and_then(|first| first.get("version"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            ),
            RawOutput::Single(single) => VersionOutput::Single(single.version.version),
        })
    }
}
