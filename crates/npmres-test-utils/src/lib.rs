//! Shared test utilities for npmres integration tests.
//!
//! Provides a self-contained stand-in for a real npm resource and registry:
//!
//! - [`FakeRegistry`]: a [`PackageRegistry`] whose published versions are
//!   empty marker files under `<root>/<package>/<version>`.
//! - [`FakeResource`]: `check`, `in` and `out` shell scripts that read and
//!   write the same registry directory, so scenarios can be driven end to
//!   end through the [`LocalRunner`](npmres_core::runner::LocalRunner)
//!   without docker, npm or network access.
//! - [`TestHarness`]: both of the above plus a scratch root, wired into a
//!   [`StepEnv`] and [`ScenarioExecutor`].
//!
//! The fake `check` accepts only [`CORRECT_TOKEN`] when a token is present.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use npmres_core::config::{HarnessConfig, RunnerConfig};
use npmres_core::credentials::Credentials;
use npmres_core::executor::ScenarioExecutor;
use npmres_core::registry::PackageRegistry;
use npmres_core::runner::{ResourceCommand, create_runner};
use npmres_core::steps::StepEnv;

pub const REGISTRY_URI: &str = "http://registry.invalid:4873";
pub const CORRECT_TOKEN: &str = "good-token";
pub const INCORRECT_TOKEN: &str = "bad-token";

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Directory-backed registry shared with [`FakeResource`].
#[derive(Debug, Clone)]
pub struct FakeRegistry {
    root: PathBuf,
}

impl FakeRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mark `package@version` as published.
    pub fn publish(&self, package: &str, version: &str) -> Result<()> {
        let dir = self.root.join(package);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(version), "")?;
        Ok(())
    }

    pub fn is_published(&self, package: &str, version: &str) -> bool {
        self.root.join(package).join(version).is_file()
    }
}

#[async_trait]
impl PackageRegistry for FakeRegistry {
    async fn package_versions(&self, package: &str) -> Result<Vec<String>> {
        let dir = self.root.join(package);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
        };
        let mut versions = Vec::new();
        for entry in entries {
            versions.push(entry?.file_name().to_string_lossy().into_owned());
        }
        versions.sort();
        Ok(versions)
    }

    async fn ensure_version_available(
        &self,
        _work_dir: &Path,
        package: &str,
        version: &str,
    ) -> Result<()> {
        self.publish(package, version)
    }

    async fn ensure_version_not_available(&self, package: &str, version: &str) -> Result<()> {
        match std::fs::remove_file(self.root.join(package).join(version)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// Extracts the first `"<key>":"<value>"` string from `$req`.
const JSON_FIELD: &str = r#"field() { printf '%s' "$req" | sed -n "s/.*\"$1\":\"\([^\"]*\)\".*/\1/p"; }"#;

/// A directory holding executable `check`, `in` and `out` scripts.
///
/// Each script saves the request it received as `<command>.request.json`
/// next to itself.
#[derive(Debug, Clone)]
pub struct FakeResource {
    dir: PathBuf,
    registry_root: PathBuf,
}

impl FakeResource {
    pub fn new(dir: impl Into<PathBuf>, registry_root: impl Into<PathBuf>) -> Result<Self> {
        let resource = Self {
            dir: dir.into(),
            registry_root: registry_root.into(),
        };
        std::fs::create_dir_all(&resource.dir)
            .with_context(|| format!("failed to create {}", resource.dir.display()))?;
        for command in [ResourceCommand::Check, ResourceCommand::In, ResourceCommand::Out] {
            resource.set_script(command, &resource.default_body(command))?;
        }
        Ok(resource)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replace the script for `command`. `body` runs after the request has
    /// been read into `$req` and saved.
    pub fn set_script(&self, command: ResourceCommand, body: &str) -> Result<()> {
        let path = self.dir.join(command.as_str());
        let script = format!(
            "#!/bin/sh\nreq=$(cat)\nprintf '%s' \"$req\" > '{saved}'\n{JSON_FIELD}\nREGISTRY='{registry}'\n{body}\n",
            saved = self.request_path(command).display(),
            registry = self.registry_root.display(),
        );
        std::fs::write(&path, script)
            .with_context(|| format!("failed to write {}", path.display()))?;
        make_executable(&path)
    }

    /// The request most recently received by `command`.
    pub fn last_request(&self, command: ResourceCommand) -> Option<serde_json::Value> {
        let raw = std::fs::read_to_string(self.request_path(command)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn request_path(&self, command: ResourceCommand) -> PathBuf {
        self.dir.join(format!("{command}.request.json"))
    }

    fn default_body(&self, command: ResourceCommand) -> String {
        let auth = format!(
            r#"case "$req" in
  *'"token":"{CORRECT_TOKEN}"'*) ;;
  *'"token"'*) echo 'npm ERR! code E401' >&2; exit 1 ;;
esac
pkg=$(field package)"#
        );
        let body = match command {
            ResourceCommand::Check => {
                r#"latest=$(ls "$REGISTRY/$pkg" 2>/dev/null | sort -t. -k1,1n -k2,2n -k3,3n | tail -n 1)
if [ -z "$latest" ]; then echo '[]'; else printf '[{"version":"%s"}]\n' "$latest"; fi"#
            }
            ResourceCommand::In => {
                r#"ver=$(printf '%s' "$req" | sed -n 's/.*"version":{"version":"\([^"]*\)"}.*/\1/p')
if [ -z "$ver" ]; then echo 'no version requested' >&2; exit 1; fi
if [ ! -e "$REGISTRY/$pkg/$ver" ]; then echo "npm ERR! 404 $pkg@$ver" >&2; exit 1; fi
printf '%s\n' "$ver" > "$1/version"
case "$req" in
  *'"skip_download":true'*) ;;
  *) mkdir -p "$1/package"; printf '{"name":"%s","version":"%s"}\n' "$pkg" "$ver" > "$1/package/package.json" ;;
esac
printf '{"version":{"version":"%s"},"metadata":[]}\n' "$ver""#
            }
            ResourceCommand::Out => {
                r#"src="$1/$(field path)"
if [ ! -f "$src/package.json" ]; then echo "no package.json in $src" >&2; exit 1; fi
vfile=$(field version)
if [ -n "$vfile" ] && [ -f "$1/$vfile" ]; then ver=$(cat "$1/$vfile")
else ver=$(sed -n 's/.*"version": *"\([^"]*\)".*/\1/p' "$src/package.json"); fi
case "$req" in
  *'"delete":true'*) rm -f "$REGISTRY/$pkg/$ver" ;;
  *)
    if [ -e "$REGISTRY/$pkg/$ver" ]; then echo "npm ERR! cannot publish over $pkg@$ver" >&2; exit 1; fi
    mkdir -p "$REGISTRY/$pkg"; : > "$REGISTRY/$pkg/$ver" ;;
esac
printf '{"version":{"version":"%s"},"metadata":[]}\n' "$ver""#
            }
        };
        format!("{auth}\n{body}")
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A fake resource, a fake registry and a scratch root under one temp dir.
pub struct TestHarness {
    /// Held to keep the directory alive.
    _root: TempDir,
    pub resource: FakeResource,
    pub registry: Arc<FakeRegistry>,
    config: Arc<HarnessConfig>,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        let root = TempDir::new().context("failed to create harness root")?;
        let registry = FakeRegistry::new(root.path().join("registry"))?;
        let resource = FakeResource::new(root.path().join("resource"), registry.root())?;
        let config = harness_config(resource.dir(), &root.path().join("scratch"));
        Ok(Self {
            _root: root,
            resource,
            registry: Arc::new(registry),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn scratch_root(&self) -> &Path {
        &self.config.scratch_root
    }

    pub fn env(&self) -> StepEnv {
        StepEnv {
            config: Arc::clone(&self.config),
            runner: create_runner(&self.config.runner),
            registry: self.registry.clone(),
        }
    }

    pub fn executor(&self) -> ScenarioExecutor {
        ScenarioExecutor::new(self.env())
    }

    /// Scratch directories that still exist under the scratch root.
    pub fn leftover_scratch_dirs(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch_root())
            .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
            .unwrap_or_default()
    }
}

/// A local-runner configuration over `resource_dir` using the fake tokens.
pub fn harness_config(resource_dir: &Path, scratch_root: &Path) -> HarnessConfig {
    HarnessConfig {
        registry_uri: REGISTRY_URI.to_string(),
        credentials: Credentials::new(CORRECT_TOKEN, INCORRECT_TOKEN),
        runner: RunnerConfig::local(resource_dir),
        scratch_root: scratch_root.to_path_buf(),
        step_timeout: HarnessConfig::DEFAULT_STEP_TIMEOUT,
    }
}
