//! Subprocess runners for the resource under test.
//!
//! A [`ResourceRunner`] launches one of the resource's three executables
//! with the scenario's scratch directory as its only argument and the JSON
//! request on stdin. Two backends exist, selected once at startup by
//! [`create_runner`]:
//!
//! - [`LocalRunner`]: `<resource_dir>/<command> <scratch_dir>`
//! - [`DockerRunner`]: `docker run --rm -i -v <scratch_dir>:/test-volume
//!   <image> /opt/resource/<command> /test-volume`

pub mod docker;
pub mod local;

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::config::{RunnerConfig, RunnerMode};
use crate::request::ResourceRequest;
use crate::response::ResourceResponse;

pub use docker::DockerRunner;
pub use local::LocalRunner;

/// One of the three executables every resource provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCommand {
    /// Detect versions.
    Check,
    /// Fetch a version into the scratch directory.
    In,
    /// Publish (or delete) a version.
    Out,
}

impl ResourceCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl fmt::Display for ResourceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "check" => Ok(Self::Check),
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            other => anyhow::bail!("unknown resource command {other:?} (expected check, in or out)"),
        }
    }
}

/// Launches resource executables.
#[async_trait]
pub trait ResourceRunner: Send + Sync {
    /// Human-readable backend name ("local" or "docker").
    fn name(&self) -> &str;

    /// Run `command` against `scratch_dir`, feeding it `request` on stdin.
    ///
    /// A non-zero exit code is returned as part of the response, not as an
    /// error. `Err` means the process could not be spawned or awaited.
    async fn run(
        &self,
        command: ResourceCommand,
        scratch_dir: &Path,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse>;
}

// Compile-time assertion: ResourceRunner must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ResourceRunner) {}
};

/// Build the runner selected by the configuration.
pub fn create_runner(config: &RunnerConfig) -> Arc<dyn ResourceRunner> {
    match config.mode {
        RunnerMode::Local => Arc::new(LocalRunner::new(&config.resource_dir)),
        RunnerMode::Docker => Arc::new(DockerRunner::new(&config.docker_binary, &config.image)),
    }
}

/// Spawn `program` with `args`, write `input` to its stdin, close stdin,
/// and capture stdout/stderr until it exits.
///
/// The child is killed if the returned future is dropped before the
/// process exits (e.g. when a step times out).
pub async fn spawn_with_input<P, I, S>(program: P, args: I, input: &str) -> Result<ResourceResponse>
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let start = Instant::now();
    let program = program.as_ref();
    let name = program.to_string_lossy();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to execute {name}"))?;

    // Take all three pipes so input and output can be pumped concurrently
    // with waiting for the process. A child that fills its stdout pipe
    // before reading stdin would otherwise deadlock us.
    let mut stdin_pipe = child.stdin.take();
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let write_stdin = async {
        if let Some(mut pipe) = stdin_pipe.take() {
            // A resource that exits without reading stdin closes the pipe;
            // that is its business, not a harness failure.
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                tracing::debug!(program = %name, error = %e, "resource did not consume stdin");
            }
            let _ = pipe.shutdown().await;
        }
    };

    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stdout_pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::debug!(program = %name, error = %e, "failed to read resource stdout");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    };

    let read_stderr = async {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stderr_pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::debug!(program = %name, error = %e, "failed to read resource stderr");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    };

    let (wait_result, (), stdout, stderr) =
        tokio::join!(child.wait(), write_stdin, read_stdout, read_stderr);
    let status = wait_result.with_context(|| format!("failed to wait on {name}"))?;

    Ok(ResourceResponse {
        exit_code: status.code(),
        stdout,
        stderr,
        duration_ms: i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_roundtrip() {
        for cmd in [ResourceCommand::Check, ResourceCommand::In, ResourceCommand::Out] {
            assert_eq!(cmd.as_str().parse::<ResourceCommand>().unwrap(), cmd);
        }
        assert!("put".parse::<ResourceCommand>().is_err());
    }

    #[test]
    fn create_runner_selects_backend() {
        let mut config = RunnerConfig::local("/opt/resource");
        assert_eq!(create_runner(&config).name(), "local");
        config.mode = RunnerMode::Docker;
        assert_eq!(create_runner(&config).name(), "docker");
    }

    #[tokio::test]
    async fn stdin_is_delivered_and_closed() {
        let resp = spawn_with_input("cat", std::iter::empty::<&str>(), r#"{"source":{}}"#)
            .await
            .expect("cat should run");
        assert_eq!(resp.exit_code, Some(0));
        assert_eq!(resp.stdout, r#"{"source":{}}"#);
    }

    #[tokio::test]
    async fn captures_stderr_and_exit_code() {
        let resp = spawn_with_input("sh", ["-c", "echo oops >&2; exit 7"], "")
            .await
            .expect("sh should run");
        assert_eq!(resp.exit_code, Some(7));
        assert!(resp.stderr.contains("oops"), "stderr: {:?}", resp.stderr);
        assert!(resp.duration_ms >= 0);
    }

    #[tokio::test]
    async fn large_output_does_not_deadlock() {
        // Well beyond a 64 KiB pipe buffer on both streams.
        let script = "head -c 300000 /dev/zero | tr '\\0' a; head -c 300000 /dev/zero | tr '\\0' b >&2";
        let resp = spawn_with_input("sh", ["-c", script], "")
            .await
            .expect("sh should run");
        assert_eq!(resp.exit_code, Some(0));
        assert_eq!(resp.stdout.len(), 300_000);
        assert_eq!(resp.stderr.len(), 300_000);
    }

    #[tokio::test]
    async fn process_ignoring_stdin_is_not_an_error() {
        let resp = spawn_with_input("true", std::iter::empty::<&str>(), &"x".repeat(1 << 20))
            .await
            .expect("true should run");
        assert_eq!(resp.exit_code, Some(0));
    }

    #[tokio::test]
    async fn nonexistent_program_is_an_error() {
        let result =
            spawn_with_input("npmres_no_such_program", std::iter::empty::<&str>(), "").await;
        assert!(result.is_err());
    }
}
