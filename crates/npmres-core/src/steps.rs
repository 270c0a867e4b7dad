//! Step execution.
//!
//! [`execute`] applies one [`Step`] to a scenario's [`ScenarioContext`].
//! Request-building steps only touch the context; `Run` steps invoke the
//! resource through the configured [`ResourceRunner`]; registry steps go
//! through the [`PackageRegistry`]; `Then` steps are assertions.

use std::sync::Arc;

use anyhow::Context;

use crate::assertions::{self, AssertionError};
use crate::config::HarnessConfig;
use crate::feature::Step;
use crate::registry::{PackageRegistry, invent_package};
use crate::request;
use crate::response::ResourceResponse;
use crate::runner::ResourceRunner;
use crate::scenario::ScenarioContext;

/// Shared, read-only collaborators available to every step.
#[derive(Clone)]
pub struct StepEnv {
    pub config: Arc<HarnessConfig>,
    pub runner: Arc<dyn ResourceRunner>,
    pub registry: Arc<dyn PackageRegistry>,
}

impl std::fmt::Debug for StepEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEnv")
            .field("config", &self.config)
            .field("runner", &self.runner.name())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Assertion(#[from] AssertionError),

    #[error("no resource has been run in this scenario yet")]
    NoResponse,

    /// Spawning, registry or filesystem failure inside the harness itself.
    #[error(transparent)]
    Harness(#[from] anyhow::Error),
}

fn last_response(ctx: &ScenarioContext) -> Result<&ResourceResponse, StepError> {
    ctx.response().ok_or(StepError::NoResponse)
}

/// Apply `step` to `ctx`.
pub async fn execute(step: &Step, ctx: &mut ScenarioContext, env: &StepEnv) -> Result<(), StepError> {
    match step {
        Step::SourceForPackage { package } => {
            ctx.request.source_for_package(package);
        }
        Step::SourceForPrivatePackage {
            package,
            credentials,
        } => {
            let token = env.config.credentials.token_for(*credentials);
            ctx.request
                .source_for_private_package(package, &env.config.registry_uri, token);
        }
        Step::GetParams { skip_download } => {
            ctx.request.get_params(*skip_download);
        }
        Step::KnownVersion { version } => {
            ctx.request.known_version(version);
        }
        Step::RegistryHasPackage {
            present,
            package,
            version,
        } => {
            if *present {
                env.registry
                    .ensure_version_available(ctx.scratch_dir(), package, version)
                    .await
                    .with_context(|| format!("failed to publish {package}@{version}"))?;
            } else {
                env.registry
                    .ensure_version_not_available(package, version)
                    .await
                    .with_context(|| format!("failed to unpublish {package}@{version}"))?;
            }
        }
        Step::PutParams { .. } => {
            ctx.request.put_params();
        }
        Step::PutParamsWithVersion {
            delete, version, ..
        } => {
            request::stage_version_file(ctx.scratch_dir(), version)?;
            ctx.request.put_params_with_version(*delete);
        }
        Step::PackageSource {
            valid,
            package,
            version,
        } => {
            let dir = request::stage_source_dir(ctx.scratch_dir())?;
            if *valid {
                invent_package(&dir, package, version)?;
            }
        }
        Step::Run(command) => {
            let response = env
                .runner
                .run(*command, ctx.scratch_dir(), &ctx.request)
                .await
                .with_context(|| format!("failed to run resource {command}"))?;
            tracing::info!(
                scenario = %ctx.id(),
                command = %command,
                exit_code = ?response.exit_code,
                duration_ms = response.duration_ms,
                "resource finished"
            );
            if !response.succeeded() {
                tracing::debug!(scenario = %ctx.id(), stderr = %response.stderr, "resource stderr");
            }
            ctx.record_response(response);
        }
        Step::ErrorReturned => {
            assertions::error_returned(last_response(ctx)?)?;
        }
        Step::VersionReturned { version } => {
            assertions::version_returned(last_response(ctx)?, version)?;
        }
        Step::FileContent { file, content } => {
            assertions::file_content(ctx.scratch_dir(), file, content)?;
        }
        Step::FileExists { file, exists } => {
            assertions::file_exists(ctx.scratch_dir(), file, *exists)?;
        }
        Step::RegistryContains {
            present,
            package,
            version,
        } => {
            let published = env
                .registry
                .package_versions(package)
                .await
                .with_context(|| format!("failed to list versions of {package}"))?;
            assertions::registry_contains(package, &published, version, *present)?;
        }
    }
    Ok(())
}
