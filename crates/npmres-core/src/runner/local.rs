//! Local executable backend.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use super::{ResourceCommand, ResourceRunner, spawn_with_input};
use crate::request::ResourceRequest;
use crate::response::ResourceResponse;

/// Runs `<resource_dir>/<command> <scratch_dir>` directly on the host.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    resource_dir: PathBuf,
}

impl LocalRunner {
    pub fn new(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
        }
    }

    /// Path to the executable for `command`.
    pub fn executable(&self, command: ResourceCommand) -> PathBuf {
        self.resource_dir.join(command.as_str())
    }
}

#[async_trait]
impl ResourceRunner for LocalRunner {
    fn name(&self) -> &str {
        "local"
    }

    async fn run(
        &self,
        command: ResourceCommand,
        scratch_dir: &Path,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse> {
        let executable = self.executable(command);
        let input = request.to_json()?;

        tracing::debug!(
            command = %command,
            executable = %executable.display(),
            scratch_dir = %scratch_dir.display(),
            "running resource locally"
        );

        spawn_with_input(&executable, [scratch_dir.as_os_str()], &input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_path_per_command() {
        let runner = LocalRunner::new("/opt/resource");
        assert_eq!(
            runner.executable(ResourceCommand::Check),
            PathBuf::from("/opt/resource/check")
        );
        assert_eq!(
            runner.executable(ResourceCommand::In),
            PathBuf::from("/opt/resource/in")
        );
        assert_eq!(
            runner.executable(ResourceCommand::Out),
            PathBuf::from("/opt/resource/out")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_from_non_utf8_resource_dir() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let resource_dir = tmp.path().join(OsStr::from_bytes(b"resource-\xff"));
        std::fs::create_dir(&resource_dir).unwrap();
        let check = resource_dir.join("check");
        std::fs::write(&check, "#!/bin/sh\ncat >/dev/null\necho '[]'\n").unwrap();
        std::fs::set_permissions(&check, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = LocalRunner::new(&resource_dir);
        let resp = runner
            .run(ResourceCommand::Check, tmp.path(), &ResourceRequest::new())
            .await
            .unwrap();
        assert_eq!(resp.exit_code, Some(0));
        assert_eq!(resp.stdout.trim(), "[]");
    }

    #[tokio::test]
    async fn missing_executable_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let runner = LocalRunner::new(tmp.path());
        let result = runner
            .run(ResourceCommand::Check, tmp.path(), &ResourceRequest::new())
            .await;
        assert!(result.is_err());
    }
}
