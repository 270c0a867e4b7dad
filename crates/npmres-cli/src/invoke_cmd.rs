//! `npmres invoke` command: run one resource command by hand.

use std::path::Path;

use anyhow::{Context, Result};

use npmres_core::config::{ConfigOverrides, RunnerConfig};
use npmres_core::request::ResourceRequest;
use npmres_core::runner::{ResourceCommand, create_runner};
use npmres_core::scenario::ScenarioContext;

/// Send the request in `request_path` to `command` and print what came
/// back. Returns whether the resource exited with code 0.
///
/// Without `dir` the resource gets a fresh scratch directory under `./tmp`,
/// removed afterwards.
pub async fn run(
    overrides: &ConfigOverrides,
    command: ResourceCommand,
    request_path: &Path,
    dir: Option<&Path>,
) -> Result<bool> {
    let raw = std::fs::read_to_string(request_path)
        .with_context(|| format!("failed to read request {}", request_path.display()))?;
    let request: ResourceRequest = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid resource request", request_path.display()))?;

    let runner = create_runner(&RunnerConfig::resolve(overrides)?);

    let (work_dir, scratch) = match dir {
        Some(dir) => {
            let dir = std::fs::canonicalize(dir)
                .with_context(|| format!("failed to resolve {}", dir.display()))?;
            (dir, None)
        }
        None => {
            let root = std::env::current_dir()
                .context("failed to determine the current directory")?
                .join("tmp");
            let ctx = ScenarioContext::setup(&root)?;
            (ctx.scratch_dir().to_path_buf(), Some(ctx))
        }
    };

    tracing::info!(command = %command, runner = runner.name(), dir = %work_dir.display(), "invoking resource");
    let result = runner.run(command, &work_dir, &request).await;

    if let Some(ctx) = scratch {
        ctx.teardown();
    }
    let response = result.with_context(|| format!("failed to run resource {command}"))?;

    match response.exit_code {
        Some(code) => println!("exit code: {code}"),
        None => println!("exit code: none (terminated by signal)"),
    }
    println!("duration: {}ms", response.duration_ms);
    println!("--- stdout ---");
    print!("{}", response.stdout);
    println!("--- stderr ---");
    print!("{}", response.stderr);

    Ok(response.succeeded())
}
