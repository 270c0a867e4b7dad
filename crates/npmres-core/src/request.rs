//! The JSON request sent to a resource on stdin.
//!
//! A request has three optional top-level keys, each omitted from the
//! serialized form when unset:
//!
//! ```json
//! {
//!   "source":  { "package": "left-pad", "registry": { "uri": "...", "token": "..." } },
//!   "version": { "version": "1.2.3" },
//!   "params":  { "path": "source-code", "delete": false, "version": "version" }
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Directory (relative to the scratch dir) holding the package to publish.
pub const SOURCE_DIR: &str = "source-code";
/// File (relative to the scratch dir) holding the version to publish.
pub const VERSION_FILE: &str = "version";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

/// What the resource tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub package: String,
    /// npm scope without the leading `@`. No step sets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryAuth>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub uri: String,
    /// `None` omits the key entirely; `Some("")` sends an empty token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("uri", &self.uri)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRef {
    pub version: String,
}

/// Per-invocation options for `in` / `out`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_download: Option<bool>,
}

impl ResourceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a public package on the resource's default registry.
    pub fn source_for_package(&mut self, package: &str) {
        self.source = Some(Source {
            package: package.to_string(),
            scope: None,
            registry: None,
        });
    }

    /// Track a package on an explicit registry with the given token.
    pub fn source_for_private_package(
        &mut self,
        package: &str,
        registry_uri: &str,
        token: Option<String>,
    ) {
        self.source = Some(Source {
            package: package.to_string(),
            scope: None,
            registry: Some(RegistryAuth {
                uri: registry_uri.to_string(),
                token,
            }),
        });
    }

    /// Params for a get step. Replaces any previous params.
    pub fn get_params(&mut self, skip_download: bool) {
        self.params = Some(Params {
            skip_download: Some(skip_download),
            ..Params::default()
        });
    }

    /// Params for a put step publishing from [`SOURCE_DIR`].
    pub fn put_params(&mut self) {
        self.params = Some(Params {
            path: Some(SOURCE_DIR.to_string()),
            ..Params::default()
        });
    }

    /// Params for a put step that reads its version from [`VERSION_FILE`]
    /// and optionally deletes instead of publishing.
    pub fn put_params_with_version(&mut self, delete: bool) {
        self.params = Some(Params {
            path: Some(SOURCE_DIR.to_string()),
            delete: Some(delete),
            version: Some(VERSION_FILE.to_string()),
            skip_download: None,
        });
    }

    pub fn known_version(&mut self, version: &str) {
        self.version = Some(VersionRef {
            version: version.to_string(),
        });
    }

    /// Serialize the request for a single invocation.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize resource request")
    }
}

/// Write the version marker read by `out` (no trailing newline).
pub fn stage_version_file(scratch_dir: &Path, version: &str) -> Result<PathBuf> {
    let path = scratch_dir.join(VERSION_FILE);
    std::fs::write(&path, version)
        .with_context(|| format!("failed to write version file {}", path.display()))?;
    Ok(path)
}

/// Create the (possibly empty) package source directory read by `out`.
pub fn stage_source_dir(scratch_dir: &Path) -> Result<PathBuf> {
    let path = scratch_dir.join(SOURCE_DIR);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create source directory {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn to_value(req: &ResourceRequest) -> serde_json::Value {
        serde_json::from_str(&req.to_json().unwrap()).unwrap()
    }

    #[test]
    fn empty_request_serializes_to_empty_object() {
        assert_eq!(to_value(&ResourceRequest::new()), json!({}));
    }

    #[test]
    fn public_package_source_has_only_package() {
        let mut req = ResourceRequest::new();
        req.source_for_package("left-pad");
        assert_eq!(to_value(&req), json!({ "source": { "package": "left-pad" } }));
    }

    #[test]
    fn missing_token_is_omitted_and_empty_token_is_kept() {
        let mut req = ResourceRequest::new();
        req.source_for_private_package("private-pkg", "http://r:4873", None);
        assert_eq!(
            to_value(&req),
            json!({ "source": { "package": "private-pkg", "registry": { "uri": "http://r:4873" } } })
        );

        req.source_for_private_package("private-pkg", "http://r:4873", Some(String::new()));
        assert_eq!(
            to_value(&req)["source"]["registry"],
            json!({ "uri": "http://r:4873", "token": "" })
        );
    }

    #[test]
    fn params_are_replaced_not_merged() {
        let mut req = ResourceRequest::new();
        req.get_params(true);
        req.put_params();
        assert_eq!(to_value(&req), json!({ "params": { "path": "source-code" } }));
    }

    #[test]
    fn put_params_with_version_shape() {
        let mut req = ResourceRequest::new();
        req.put_params_with_version(true);
        assert_eq!(
            to_value(&req),
            json!({ "params": { "path": "source-code", "delete": true, "version": "version" } })
        );
    }

    #[test]
    fn known_version_and_skip_download() {
        let mut req = ResourceRequest::new();
        req.source_for_package("left-pad");
        req.get_params(false);
        req.known_version("1.2.3");
        assert_eq!(
            to_value(&req),
            json!({
                "source": { "package": "left-pad" },
                "version": { "version": "1.2.3" },
                "params": { "skip_download": false }
            })
        );
    }

    #[test]
    fn registry_auth_debug_hides_token() {
        let auth = RegistryAuth {
            uri: "http://r".to_string(),
            token: Some("s3cret".to_string()),
        };
        assert!(!format!("{auth:?}").contains("s3cret"));
    }

    #[test]
    fn staging_writes_version_without_newline() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = stage_version_file(tmp.path(), "2.0.0").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "2.0.0");

        let dir = stage_source_dir(tmp.path()).unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
    }
}
