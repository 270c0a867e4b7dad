//! Container backend.
//!
//! Bind-mounts the scratch directory at `/test-volume` and runs the
//! resource's entrypoint inside the image. The container is removed on exit
//! (`--rm`) and stdin stays attached (`-i`) so the request can be piped in.

use std::path::Path;

use anyhow::{Result, bail};
use async_trait::async_trait;

use super::{ResourceCommand, ResourceRunner, spawn_with_input};
use crate::request::ResourceRequest;
use crate::response::ResourceResponse;

/// Mount point of the scratch directory inside the container.
pub const CONTAINER_VOLUME: &str = "/test-volume";
/// Directory holding the resource executables inside the image.
pub const CONTAINER_RESOURCE_DIR: &str = "/opt/resource";

#[derive(Debug, Clone)]
pub struct DockerRunner {
    docker_binary: String,
    image: String,
}

impl DockerRunner {
    pub fn new(docker_binary: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            docker_binary: docker_binary.into(),
            image: image.into(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Arguments passed to `docker` for one invocation.
    fn docker_args(&self, command: ResourceCommand, scratch_dir: &Path) -> Vec<String> {
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            "-v".to_string(),
            format!("{}:{CONTAINER_VOLUME}", scratch_dir.display()),
            self.image.clone(),
            format!("{CONTAINER_RESOURCE_DIR}/{}", command.as_str()),
            CONTAINER_VOLUME.to_string(),
        ]
    }
}

#[async_trait]
impl ResourceRunner for DockerRunner {
    fn name(&self) -> &str {
        "docker"
    }

    async fn run(
        &self,
        command: ResourceCommand,
        scratch_dir: &Path,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse> {
        // Docker resolves relative bind mounts as named volumes.
        if !scratch_dir.is_absolute() {
            bail!(
                "scratch directory must be absolute to be mounted: {}",
                scratch_dir.display()
            );
        }

        let args = self.docker_args(command, scratch_dir);
        let input = request.to_json()?;

        tracing::debug!(
            command = %command,
            image = %self.image,
            scratch_dir = %scratch_dir.display(),
            "running resource in container"
        );

        spawn_with_input(&self.docker_binary, &args, &input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_args_mount_scratch_and_run_entrypoint() {
        let runner = DockerRunner::new("docker", "timotto/concourse-npm-resource:latest");
        let args = runner.docker_args(ResourceCommand::In, Path::new("/work/tmp/vol-1"));
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "-i",
                "-v",
                "/work/tmp/vol-1:/test-volume",
                "timotto/concourse-npm-resource:latest",
                "/opt/resource/in",
                "/test-volume",
            ]
        );
    }

    #[tokio::test]
    async fn relative_scratch_dir_is_rejected() {
        let runner = DockerRunner::new("docker", "img");
        let err = runner
            .run(
                ResourceCommand::Check,
                Path::new("tmp/vol"),
                &ResourceRequest::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[tokio::test]
    async fn passes_request_through_docker_binary() {
        // Stand in for docker with a script that echoes its argv and stdin.
        let tmp = tempfile::TempDir::new().unwrap();
        let fake = tmp.path().join("fake-docker");
        std::fs::write(&fake, "#!/bin/sh\necho \"$@\"\ncat\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let runner = DockerRunner::new(fake.to_string_lossy(), "img:1");
        let mut request = ResourceRequest::new();
        request.source_for_package("left-pad");
        let resp = runner
            .run(ResourceCommand::Check, tmp.path(), &request)
            .await
            .unwrap();

        assert_eq!(resp.exit_code, Some(0));
        let mut lines = resp.stdout.lines();
        let argv = lines.next().unwrap();
        assert!(argv.starts_with("run --rm -i -v "), "argv: {argv}");
        assert!(argv.ends_with("img:1 /opt/resource/check /test-volume"), "argv: {argv}");
        assert_eq!(lines.next(), Some(r#"{"source":{"package":"left-pad"}}"#));
    }
}
