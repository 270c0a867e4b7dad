//! Outcome checks for a scenario.
//!
//! Every check returns an [`AssertionError`] carrying the expected and
//! actual values, so a failing scenario report is self-explanatory.

use std::path::Path;

use crate::response::ResourceResponse;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssertionError {
    #[error("expected a non-zero exit code, got 0 (stdout: {stdout:?})")]
    ExpectedFailure { stdout: String },

    #[error("expected exit code 0, got {} (stderr: {stderr:?})", describe_exit(*.exit_code))]
    ExpectedSuccess {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("stdout is not a recognized version document: {reason} (stdout: {stdout:?})")]
    MalformedOutput { reason: String, stdout: String },

    #[error("expected version {expected:?}, got {actual:?}")]
    VersionMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("content of {file:?}: expected {expected:?}, got {actual:?}")]
    FileContent {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("could not read {file:?}: {reason}")]
    FileUnreadable { file: String, reason: String },

    #[error("expected file {file:?} to {}exist", if *.should_exist { "" } else { "not " })]
    FileExistence { file: String, should_exist: bool },

    #[error(
        "expected {} of {package}@{version} in the registry, found {found} (published: {published:?})",
        if *.should_exist { "one copy" } else { "no copy" }
    )]
    RegistryState {
        package: String,
        version: String,
        should_exist: bool,
        found: usize,
        published: Vec<String>,
    },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "a signal".to_string(),
    }
}

/// The resource reported failure. Death by signal counts as failure.
pub fn error_returned(response: &ResourceResponse) -> Result<(), AssertionError> {
    if response.succeeded() {
        return Err(AssertionError::ExpectedFailure {
            stdout: response.stdout.clone(),
        });
    }
    Ok(())
}

/// The resource succeeded and reported exactly `expected` on stdout.
pub fn version_returned(response: &ResourceResponse, expected: &str) -> Result<(), AssertionError> {
    if !response.succeeded() {
        return Err(AssertionError::ExpectedSuccess {
            exit_code: response.exit_code,
            stderr: response.stderr.clone(),
        });
    }
    let output = response.version_output()?;
    match output.version() {
        Some(actual) if actual == expected => Ok(()),
        actual => Err(AssertionError::VersionMismatch {
            expected: expected.to_string(),
            actual: actual.map(str::to_string),
        }),
    }
}

/// `file` inside the scratch dir holds `expected` followed by exactly one
/// newline.
pub fn file_content(scratch_dir: &Path, file: &str, expected: &str) -> Result<(), AssertionError> {
    let expected = format!("{expected}\n");
    let actual = std::fs::read_to_string(scratch_dir.join(file)).map_err(|e| {
        AssertionError::FileUnreadable {
            file: file.to_string(),
            reason: e.to_string(),
        }
    })?;
    if actual != expected {
        return Err(AssertionError::FileContent {
            file: file.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

pub fn file_exists(scratch_dir: &Path, file: &str, should_exist: bool) -> Result<(), AssertionError> {
    if scratch_dir.join(file).exists() != should_exist {
        return Err(AssertionError::FileExistence {
            file: file.to_string(),
            should_exist,
        });
    }
    Ok(())
}

/// `published` contains `version` exactly once (or not at all).
pub fn registry_contains(
    package: &str,
    published: &[String],
    version: &str,
    should_exist: bool,
) -> Result<(), AssertionError> {
    let found = published.iter().filter(|v| v.as_str() == version).count();
    let wanted = usize::from(should_exist);
    if found != wanted {
        return Err(AssertionError::RegistryState {
            package: package.to_string(),
            version: version.to_string(),
            should_exist,
            found,
            published: published.to_vec(),
        });
    }
    Ok(())
}
