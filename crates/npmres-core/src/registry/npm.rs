//! [`PackageRegistry`] backed by the `npm` CLI.
//!
//! Every call writes a throw-away npmrc carrying the registry URL and the
//! auth token and points `npm` at it with `--userconfig`, so the user's own
//! `~/.npmrc` never leaks into (or gets modified by) a test run.

use std::io::Write;
use std::path::Path;
use std::process::Output;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{PackageRegistry, invent_package};

#[derive(Clone)]
pub struct NpmCliRegistry {
    uri: String,
    token: String,
    npm_binary: String,
}

impl std::fmt::Debug for NpmCliRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpmCliRegistry")
            .field("uri", &self.uri)
            .field("npm_binary", &self.npm_binary)
            .finish()
    }
}

/// `npm view <pkg> versions --json` prints a bare string when only one
/// version is published.
#[derive(Deserialize)]
#[serde(untagged)]
enum ViewVersions {
    Many(Vec<String>),
    One(String),
}

impl NpmCliRegistry {
    pub fn new(uri: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            token: token.into(),
            npm_binary: "npm".to_string(),
        }
    }

    /// Use a specific `npm` binary instead of the one on `$PATH`.
    pub fn with_binary(mut self, npm_binary: impl Into<String>) -> Self {
        self.npm_binary = npm_binary.into();
        self
    }

    /// Contents of the npmrc used for every call.
    fn npmrc(&self) -> String {
        format!(
            "registry={}\n{}:_authToken={}\n",
            self.uri,
            auth_key(&self.uri),
            self.token
        )
    }

    /// Run `npm` with the harness npmrc, optionally inside `cwd`.
    async fn npm(&self, args: &[&str], cwd: Option<&Path>) -> Result<Output> {
        let mut npmrc = tempfile::NamedTempFile::new().context("failed to create npmrc")?;
        npmrc
            .write_all(self.npmrc().as_bytes())
            .context("failed to write npmrc")?;

        let mut command = Command::new(&self.npm_binary);
        command
            .args(args)
            .arg("--registry")
            .arg(&self.uri)
            .arg("--userconfig")
            .arg(npmrc.path())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        tracing::debug!(args = ?args, registry = %self.uri, "running npm");

        command
            .output()
            .await
            .with_context(|| format!("failed to run {} {}", self.npm_binary, args.join(" ")))
    }
}

/// The npmrc key scoping a token to a registry: the URL without its scheme,
/// always ending in `/`.
fn auth_key(uri: &str) -> String {
    let without_scheme = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    let mut key = format!("//{without_scheme}");
    if !key.ends_with('/') {
        key.push('/');
    }
    key
}

fn is_not_found(output: &Output) -> bool {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout.contains("E404") || stderr.contains("E404")
}

fn parse_versions(stdout: &str) -> Result<Vec<String>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: ViewVersions =
        serde_json::from_str(stdout).context("unexpected output from npm view")?;
    Ok(match parsed {
        ViewVersions::Many(versions) => versions,
        ViewVersions::One(version) => vec![version],
    })
}

#[async_trait]
impl PackageRegistry for NpmCliRegistry {
    async fn package_versions(&self, package: &str) -> Result<Vec<String>> {
        let output = self.npm(&["view", package, "versions", "--json"], None).await?;

        if !output.status.success() {
            if is_not_found(&output) {
                return Ok(Vec::new());
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("npm view {package} failed: {stderr}");
        }

        parse_versions(&String::from_utf8_lossy(&output.stdout))
    }

    async fn ensure_version_available(
        &self,
        work_dir: &Path,
        package: &str,
        version: &str,
    ) -> Result<()> {
        let versions = self.package_versions(package).await?;
        if versions.iter().any(|v| v == version) {
            tracing::debug!(package, version, "version already published");
            return Ok(());
        }

        let staging = tempfile::Builder::new()
            .prefix("npm-publish-")
            .tempdir_in(work_dir)
            .with_context(|| format!("failed to create staging dir in {}", work_dir.display()))?;
        invent_package(staging.path(), package, version)?;

        tracing::info!(package, version, registry = %self.uri, "publishing fixture package");
        let output = self.npm(&["publish"], Some(staging.path())).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("npm publish {package}@{version} failed: {stderr}");
        }

        Ok(())
    }

    async fn ensure_version_not_available(&self, package: &str, version: &str) -> Result<()> {
        let versions = self.package_versions(package).await?;
        if !versions.iter().any(|v| v == version) {
            return Ok(());
        }

        tracing::info!(package, version, registry = %self.uri, "unpublishing fixture package");
        let spec = format!("{package}@{version}");
        let output = self.npm(&["unpublish", &spec, "--force"], None).await?;
        if !output.status.success() && !is_not_found(&output) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("npm unpublish {spec} failed: {stderr}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_key_strips_scheme_and_adds_slash() {
        assert_eq!(auth_key("http://localhost:4873"), "//localhost:4873/");
        assert_eq!(
            auth_key("https://npm.example.test/registry/"),
            "//npm.example.test/registry/"
        );
    }

    #[test]
    fn npmrc_scopes_token_to_registry() {
        let registry = NpmCliRegistry::new("http://localhost:4873", "t0ken");
        assert_eq!(
            registry.npmrc(),
            "registry=http://localhost:4873\n//localhost:4873/:_authToken=t0ken\n"
        );
    }

    #[test]
    fn debug_hides_token() {
        let registry = NpmCliRegistry::new("http://localhost:4873", "t0ken");
        assert!(!format!("{registry:?}").contains("t0ken"));
    }

    #[test]
    fn parses_both_view_shapes() {
        assert_eq!(
            parse_versions("[\"1.0.0\", \"1.1.0\"]\n").unwrap(),
            vec!["1.0.0", "1.1.0"]
        );
        assert_eq!(parse_versions("\"1.0.0\"\n").unwrap(), vec!["1.0.0"]);
        assert!(parse_versions("").unwrap().is_empty());
        assert!(parse_versions("{\"error\":{}}").is_err());
    }

    #[cfg(unix)]
    fn fake_npm(dir: &Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("npm");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn e404_means_no_versions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let npm = fake_npm(
            tmp.path(),
            "echo '{\"error\":{\"code\":\"E404\"}}'; echo 'npm ERR! code E404' >&2; exit 1",
        );
        let registry = NpmCliRegistry::new("http://localhost:4873", "t").with_binary(npm);
        assert!(registry.package_versions("nope").await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn other_view_failures_are_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let npm = fake_npm(tmp.path(), "echo 'npm ERR! code ECONNREFUSED' >&2; exit 1");
        let registry = NpmCliRegistry::new("http://localhost:4873", "t").with_binary(npm);
        let err = registry.package_versions("pkg").await.unwrap_err();
        assert!(err.to_string().contains("ECONNREFUSED"), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn publish_runs_in_staged_package_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("calls.log");
        // `view` reports nothing published; `publish` records its cwd and
        // the staged manifest.
        let script = format!(
            "case \"$1\" in\n  view) echo '[]' ;;\n  publish) pwd >> {log}; cat package.json >> {log} ;;\nesac",
            log = log.display()
        );
        let npm = fake_npm(tmp.path(), &script);
        let registry = NpmCliRegistry::new("http://localhost:4873", "t").with_binary(npm);

        registry
            .ensure_version_available(tmp.path(), "fixture-pkg", "2.0.0")
            .await
            .unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert!(calls.contains("npm-publish-"), "calls: {calls}");
        assert!(calls.contains("\"version\": \"2.0.0\""), "calls: {calls}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unpublish_skipped_when_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("calls.log");
        let script = format!(
            "echo \"$1\" >> {log}\ncase \"$1\" in\n  view) echo '[\"1.0.0\"]' ;;\nesac",
            log = log.display()
        );
        let npm = fake_npm(tmp.path(), &script);
        let registry = NpmCliRegistry::new("http://localhost:4873", "t").with_binary(npm);

        registry
            .ensure_version_not_available("pkg", "9.9.9")
            .await
            .unwrap();
        registry
            .ensure_version_not_available("pkg", "1.0.0")
            .await
            .unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["view", "view", "unpublish"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abandoned_npm_call_is_killed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("finished");
        let npm = fake_npm(
            tmp.path(),
            &format!("sleep 2; touch {}; echo '[]'", marker.display()),
        );
        let registry = NpmCliRegistry::new("http://localhost:4873", "t").with_binary(npm);

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(300),
            registry.package_versions("pkg"),
        )
        .await;
        assert!(result.is_err());

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(!marker.exists(), "npm kept running after its caller gave up");
    }
}
