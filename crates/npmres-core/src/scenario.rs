//! Per-scenario fixture.
//!
//! A [`ScenarioContext`] owns everything a scenario mutates: its scratch
//! directory, the request being built, and the last response. It is created
//! by [`ScenarioContext::setup`] and passed explicitly to every step; there
//! is no state shared between scenarios.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use uuid::Uuid;

use crate::request::ResourceRequest;
use crate::response::ResourceResponse;

/// Name prefix for scratch directories; 8 random characters follow.
pub const SCRATCH_PREFIX: &str = "npm-resource-test-volume-";

#[derive(Debug)]
pub struct ScenarioContext {
    id: Uuid,
    /// Removes the directory on drop if `teardown` is never reached.
    scratch: TempDir,
    pub request: ResourceRequest,
    response: Option<ResourceResponse>,
}

impl ScenarioContext {
    /// Create a fresh scratch directory under `scratch_root` and an empty
    /// request.
    pub fn setup(scratch_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(scratch_root).with_context(|| {
            format!("failed to create scratch root {}", scratch_root.display())
        })?;

        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .rand_bytes(8)
            .tempdir_in(scratch_root)
            .with_context(|| {
                format!(
                    "failed to create scratch directory under {}",
                    scratch_root.display()
                )
            })?;

        let id = Uuid::new_v4();
        tracing::debug!(scenario = %id, scratch_dir = %scratch.path().display(), "scenario set up");

        Ok(Self {
            id,
            scratch,
            request: ResourceRequest::new(),
            response: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn record_response(&mut self, response: ResourceResponse) {
        self.response = Some(response);
    }

    /// The response of the most recent resource invocation, if any.
    pub fn response(&self) -> Option<&ResourceResponse> {
        self.response.as_ref()
    }

    /// Recursively remove the scratch directory.
    ///
    /// Never fails: a directory that is already gone, or one that cannot be
    /// removed (e.g. files written as root by a container), is logged and
    /// ignored.
    pub fn teardown(self) {
        let id = self.id;
        let path: PathBuf = self.scratch.path().to_path_buf();
        match self.scratch.close() {
            Ok(()) => tracing::debug!(scenario = %id, "scratch directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(scenario = %id, path = %path.display(), "scratch directory already gone");
            }
            Err(e) => {
                tracing::warn!(
                    scenario = %id,
                    path = %path.display(),
                    error = %e,
                    "failed to remove scratch directory"
                );
            }
        }
    }
}
