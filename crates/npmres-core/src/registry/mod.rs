//! Package registry collaborator.
//!
//! Scenarios prepare and inspect registry state independently of the
//! resource under test: they make sure a version is (or is not) published
//! before running the resource, and check what is published afterwards.

pub mod npm;

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

pub use npm::NpmCliRegistry;

#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// All published versions of `package`. An unknown package has none.
    async fn package_versions(&self, package: &str) -> Result<Vec<String>>;

    /// Publish a synthetic `package@version` unless it already exists.
    ///
    /// `work_dir` is a scratch location the implementation may use to
    /// stage the package.
    async fn ensure_version_available(
        &self,
        work_dir: &Path,
        package: &str,
        version: &str,
    ) -> Result<()>;

    /// Remove `package@version` if it is published.
    async fn ensure_version_not_available(&self, package: &str, version: &str) -> Result<()>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PackageRegistry) {}
};

/// Write a minimal publishable npm package into `dir`.
pub fn invent_package(dir: &Path, package: &str, version: &str) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create package directory {}", dir.display()))?;

    let manifest = json!({
        "name": package,
        "version": version,
        "description": format!("Synthetic package {package}@{version} for resource tests"),
        "main": "index.js",
        "license": "MIT",
    });
    let manifest =
        serde_json::to_string_pretty(&manifest).context("failed to serialize package.json")?;
    std::fs::write(dir.join("package.json"), format!("{manifest}\n"))
        .with_context(|| format!("failed to write package.json in {}", dir.display()))?;

    let index = format!("module.exports = {{ name: {package:?}, version: {version:?} }};\n");
    std::fs::write(dir.join("index.js"), index)
        .with_context(|| format!("failed to write index.js in {}", dir.display()))?;

    Ok(())
}
