//! The step vocabulary.
//!
//! Each step phrase maps to one [`Step`] variant. The Gherkin keyword in
//! front of a phrase is not significant; only the phrase is matched.
//! Captures written `"..."` in the phrase table are greedy, so a value may
//! itself contain quotes.

use std::fmt;

use crate::credentials::CredentialSet;
use crate::runner::ResourceCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `a source configuration for package "P"`
    SourceForPackage { package: String },
    /// `a source configuration for private package "P" with C credentials`
    SourceForPrivatePackage {
        package: String,
        credentials: CredentialSet,
    },
    /// `a get step with skip_download: B params`
    GetParams { skip_download: bool },
    /// `a known version "V" for the resource`
    KnownVersion { version: String },
    /// `the registry has (a|no) package "P" available in version "V"`
    RegistryHasPackage {
        present: bool,
        package: String,
        version: String,
    },
    /// `I have a put step with params package: "P"`
    PutParams { package: String },
    /// `I have a put step with params package: "P" and delete: B and version: "V"`
    PutParamsWithVersion {
        package: String,
        delete: bool,
        version: String,
    },
    /// `I have (valid|invalid) npm package source code for package "P" with version "V"`
    PackageSource {
        valid: bool,
        package: String,
        version: String,
    },
    /// `the resource is checked` / `the resource is fetched` /
    /// `the package is published`
    Run(ResourceCommand),
    /// `an error is returned`
    ErrorReturned,
    /// `version "V" is returned`
    VersionReturned { version: String },
    /// `the content of file "F" is "C"`
    FileContent { file: String, content: String },
    /// `the file "F" does exist` / `the file "F" does not exist`
    FileExists { file: String, exists: bool },
    /// `there should be (a|no) package "P" available with version "V" in the registry`
    RegistryContains {
        present: bool,
        package: String,
        version: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepParseError {
    #[error("no step matches {0:?}")]
    Unknown(String),

    #[error("invalid {what} {value:?} in step {phrase:?} (expected {expected})")]
    InvalidValue {
        phrase: String,
        what: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Match `text` against literal `parts` with one capture between each pair
/// of adjacent parts. Captures are greedy, like `(.*)` in a regex: the
/// rightmost occurrence of the following literal is tried first.
fn match_parts<'t>(text: &'t str, parts: &[&str]) -> Option<Vec<&'t str>> {
    fn go<'t>(rest: &'t str, parts: &[&str], captures: &mut Vec<&'t str>) -> bool {
        match parts {
            [] => rest.is_empty(),
            [last] => {
                // The final literal anchors the end; the capture before it
                // was already taken by the caller.
                rest == *last
            }
            [next, tail @ ..] => {
                let Some(after) = rest.strip_prefix(*next) else {
                    return false;
                };
                let following = tail[0];
                let is_final_capture = tail.len() == 1;
                // Candidate end positions for this capture, greedy first.
                let mut candidates: Vec<usize> = if is_final_capture {
                    if after.ends_with(following) {
                        vec![after.len() - following.len()]
                    } else {
                        Vec::new()
                    }
                } else {
                    after.match_indices(following).map(|(i, _)| i).collect()
                };
                candidates.reverse();
                for end in candidates {
                    captures.push(&after[..end]);
                    if go(&after[end..], tail, captures) {
                        return true;
                    }
                    captures.pop();
                }
                false
            }
        }
    }

    let mut captures = Vec::new();
    if parts.len() == 1 {
        return (text == parts[0]).then_some(captures);
    }
    go(text, parts, &mut captures).then_some(captures)
}

fn parse_bool(phrase: &str, what: &'static str, value: &str) -> Result<bool, StepParseError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(StepParseError::InvalidValue {
            phrase: phrase.to_string(),
            what,
            value: other.to_string(),
            expected: "true or false",
        }),
    }
}

fn parse_presence(phrase: &str, value: &str) -> Result<bool, StepParseError> {
    match value {
        "a" => Ok(true),
        "no" => Ok(false),
        other => Err(StepParseError::InvalidValue {
            phrase: phrase.to_string(),
            what: "quantifier",
            value: other.to_string(),
            expected: "a or no",
        }),
    }
}

fn parse_validity(phrase: &str, value: &str) -> Result<bool, StepParseError> {
    match value {
        "valid" => Ok(true),
        "invalid" => Ok(false),
        other => Err(StepParseError::InvalidValue {
            phrase: phrase.to_string(),
            what: "validity",
            value: other.to_string(),
            expected: "valid or invalid",
        }),
    }
}

impl Step {
    /// Parse a step phrase (without its Gherkin keyword).
    pub fn parse(phrase: &str) -> Result<Self, StepParseError> {
        let p = phrase.trim();

        match p {
            "the resource is checked" => return Ok(Self::Run(ResourceCommand::Check)),
            "the resource is fetched" => return Ok(Self::Run(ResourceCommand::In)),
            "the package is published" => return Ok(Self::Run(ResourceCommand::Out)),
            "an error is returned" => return Ok(Self::ErrorReturned),
            _ => {}
        }

        if let Some(c) = match_parts(
            p,
            &["a source configuration for private package \"", "\" with ", " credentials"],
        ) {
            let credentials =
                c[1].parse::<CredentialSet>()
                    .map_err(|_| StepParseError::InvalidValue {
                        phrase: p.to_string(),
                        what: "credential set",
                        value: c[1].to_string(),
                        expected: "correct, incorrect, empty or missing",
                    })?;
            return Ok(Self::SourceForPrivatePackage {
                package: c[0].to_string(),
                credentials,
            });
        }
        if let Some(c) = match_parts(p, &["a source configuration for package \"", "\""]) {
            return Ok(Self::SourceForPackage {
                package: c[0].to_string(),
            });
        }
        if let Some(c) = match_parts(p, &["a get step with skip_download: ", " params"]) {
            return Ok(Self::GetParams {
                skip_download: parse_bool(p, "skip_download flag", c[0])?,
            });
        }
        if let Some(c) = match_parts(p, &["a known version \"", "\" for the resource"]) {
            return Ok(Self::KnownVersion {
                version: c[0].to_string(),
            });
        }
        if let Some(c) = match_parts(
            p,
            &["the registry has ", " package \"", "\" available in version \"", "\""],
        ) {
            return Ok(Self::RegistryHasPackage {
                present: parse_presence(p, c[0])?,
                package: c[1].to_string(),
                version: c[2].to_string(),
            });
        }
        if let Some(c) = match_parts(
            p,
            &[
                "I have a put step with params package: \"",
                "\" and delete: ",
                " and version: \"",
                "\"",
            ],
        ) {
            // The package name must not contain quotes here.
            if !c[0].contains('"') {
                return Ok(Self::PutParamsWithVersion {
                    package: c[0].to_string(),
                    delete: parse_bool(p, "delete flag", c[1])?,
                    version: c[2].to_string(),
                });
            }
        }
        if let Some(c) = match_parts(p, &["I have a put step with params package: \"", "\""]) {
            if !c[0].contains('"') {
                return Ok(Self::PutParams {
                    package: c[0].to_string(),
                });
            }
        }
        if let Some(c) = match_parts(
            p,
            &[
                "I have ",
                " npm package source code for package \"",
                "\" with version \"",
                "\"",
            ],
        ) {
            return Ok(Self::PackageSource {
                valid: parse_validity(p, c[0])?,
                package: c[1].to_string(),
                version: c[2].to_string(),
            });
        }
        if let Some(c) = match_parts(p, &["version \"", "\" is returned"]) {
            if !c[0].contains('"') {
                return Ok(Self::VersionReturned {
                    version: c[0].to_string(),
                });
            }
        }
        if let Some(c) = match_parts(p, &["the content of file \"", "\" is \"", "\""]) {
            return Ok(Self::FileContent {
                file: c[0].to_string(),
                content: c[1].to_string(),
            });
        }
        if let Some(c) = match_parts(p, &["the file \"", "\" does not exist"]) {
            return Ok(Self::FileExists {
                file: c[0].to_string(),
                exists: false,
            });
        }
        if let Some(c) = match_parts(p, &["the file \"", "\" does exist"]) {
            return Ok(Self::FileExists {
                file: c[0].to_string(),
                exists: true,
            });
        }
        if let Some(c) = match_parts(
            p,
            &[
                "there should be ",
                " package \"",
                "\" available with version \"",
                "\" in the registry",
            ],
        ) {
            return Ok(Self::RegistryContains {
                present: parse_presence(p, c[0])?,
                package: c[1].to_string(),
                version: c[2].to_string(),
            });
        }

        Err(StepParseError::Unknown(p.to_string()))
    }

    /// The phrase patterns understood by [`Step::parse`], for `npmres steps`.
    pub fn vocabulary() -> &'static [&'static str] {
        &[
            "a source configuration for package \"<package>\"",
            "a source configuration for private package \"<package>\" with <correct|incorrect|empty|missing> credentials",
            "a get step with skip_download: <true|false> params",
            "a known version \"<version>\" for the resource",
            "the registry has <a|no> package \"<package>\" available in version \"<version>\"",
            "I have a put step with params package: \"<package>\"",
            "I have a put step with params package: \"<package>\" and delete: <true|false> and version: \"<version>\"",
            "I have <valid|invalid> npm package source code for package \"<package>\" with version \"<version>\"",
            "the resource is checked",
            "the resource is fetched",
            "the package is published",
            "an error is returned",
            "version \"<version>\" is returned",
            "the content of file \"<file>\" is \"<content>\"",
            "the file \"<file>\" does exist",
            "the file \"<file>\" does not exist",
            "there should be <a|no> package \"<package>\" available with version \"<version>\" in the registry",
        ]
    }
}

fn a_or_no(present: bool) -> &'static str {
    if present { "a" } else { "no" }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceForPackage { package } => {
                write!(f, "a source configuration for package \"{package}\"")
            }
            Self::SourceForPrivatePackage {
                package,
                credentials,
            } => write!(
                f,
                "a source configuration for private package \"{package}\" with {credentials} credentials"
            ),
            Self::GetParams { skip_download } => {
                write!(f, "a get step with skip_download: {skip_download} params")
            }
            Self::KnownVersion { version } => {
                write!(f, "a known version \"{version}\" for the resource")
            }
            Self::RegistryHasPackage {
                present,
                package,
                version,
            } => write!(
                f,
                "the registry has {} package \"{package}\" available in version \"{version}\"",
                a_or_no(*present)
            ),
            Self::PutParams { package } => {
                write!(f, "I have a put step with params package: \"{package}\"")
            }
            Self::PutParamsWithVersion {
                package,
                delete,
                version,
            } => write!(
                f,
                "I have a put step with params package: \"{package}\" and delete: {delete} and version: \"{version}\""
            ),
            Self::PackageSource {
                valid,
                package,
                version,
            } => write!(
                f,
                "I have {} npm package source code for package \"{package}\" with version \"{version}\"",
                if *valid { "valid" } else { "invalid" }
            ),
            Self::Run(ResourceCommand::Check) => f.write_str("the resource is checked"),
            Self::Run(ResourceCommand::In) => f.write_str("the resource is fetched"),
            Self::Run(ResourceCommand::Out) => f.write_str("the package is published"),
            Self::ErrorReturned => f.write_str("an error is returned"),
            Self::VersionReturned { version } => write!(f, "version \"{version}\" is returned"),
            Self::FileContent { file, content } => {
                write!(f, "the content of file \"{file}\" is \"{content}\"")
            }
            Self::FileExists { file, exists } => write!(
                f,
                "the file \"{file}\" does {}exist",
                if *exists { "" } else { "not " }
            ),
            Self::RegistryContains {
                present,
                package,
                version,
            } => write!(
                f,
                "there should be {} package \"{package}\" available with version \"{version}\" in the registry",
                a_or_no(*present)
            ),
        }
    }
}
