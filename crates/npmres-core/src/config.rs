//! Harness configuration.
//!
//! Values are resolved once at startup through the chain
//! CLI flag > environment variable > config file > default, and the result
//! is shared read-only for the rest of the run. A required value that is
//! absent from every layer aborts the run before any scenario executes.
//!
//! The config file lives at `$XDG_CONFIG_HOME/npmres/config.toml` (or
//! `~/.config/npmres/config.toml`) unless an explicit path is given.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;

pub const ENV_REGISTRY: &str = "TEST_REGISTRY";
pub const ENV_CORRECT_CREDENTIALS: &str = "CORRECT_CREDENTIALS";
pub const ENV_INCORRECT_CREDENTIALS: &str = "INCORRECT_CREDENTIALS";
pub const ENV_RUNNER: &str = "TEST_RUNNER";
pub const ENV_DOCKER_IMAGE: &str = "DOCKER_IMAGE";
pub const ENV_RESOURCE_DIR: &str = "RESOURCE_DIR";
pub const ENV_SCRATCH_ROOT: &str = "NPMRES_SCRATCH_ROOT";
pub const ENV_STEP_TIMEOUT: &str = "NPMRES_STEP_TIMEOUT_SECS";

/// Errors raised while resolving configuration. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is undefined")]
    Missing { key: &'static str },

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read config file at {}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {}", path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to determine the current directory")]
    CurrentDir(#[source] std::io::Error),
}

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub runner: RunnerSection,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incorrect: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerSection {
    /// `docker` or `local`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_dir: Option<PathBuf>,
}

/// Return the npmres config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/npmres` or `~/.config/npmres`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("npmres");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("npmres")
}

/// Return the default config file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load and parse a config file.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize and write a config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix since the file holds tokens.
pub fn save_config(path: &Path, config: &ConfigFile) -> anyhow::Result<()> {
    use anyhow::Context;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// How the resource executables are launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerMode {
    /// `docker run` against the resource image.
    Docker,
    /// Executables under a local resource directory.
    Local,
}

impl RunnerMode {
    /// Interpret a `TEST_RUNNER` style setting. Only `docker` selects the
    /// container runner; every other value means local executables.
    pub fn from_setting(value: &str) -> Self {
        if value == "docker" {
            Self::Docker
        } else {
            Self::Local
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Local => "local",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub mode: RunnerMode,
    /// Image reference used by the docker runner.
    pub image: String,
    /// Directory holding `check`, `in` and `out` for the local runner.
    pub resource_dir: PathBuf,
    /// Docker CLI binary, found via `$PATH` by default.
    pub docker_binary: String,
}

impl RunnerConfig {
    pub const DEFAULT_IMAGE: &str = "timotto/concourse-npm-resource:latest";
    pub const DEFAULT_RESOURCE_DIR: &str = "/opt/resource";

    /// A local runner over `resource_dir`, used by tests and `npmres invoke`.
    pub fn local(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: RunnerMode::Local,
            image: Self::DEFAULT_IMAGE.to_string(),
            resource_dir: resource_dir.into(),
            docker_binary: "docker".to_string(),
        }
    }

    /// Resolve only the runner settings from the process environment and
    /// config file. Unlike [`HarnessConfig::resolve`] this needs no registry
    /// or credentials.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let file = load_layer(overrides)?;
        Ok(Self::resolve_from(overrides, file.as_ref(), |key| {
            std::env::var(key).ok()
        }))
    }

    /// Resolve the runner settings from explicit layers.
    pub fn resolve_from(
        overrides: &ConfigOverrides,
        file: Option<&ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let default_file = ConfigFile::default();
        let file = file.unwrap_or(&default_file);

        let mode = match overrides.runner_mode {
            Some(mode) => mode,
            None => env(ENV_RUNNER)
                .or_else(|| file.runner.mode.clone())
                .map(|value| RunnerMode::from_setting(&value))
                .unwrap_or(RunnerMode::Docker),
        };
        let image = overrides
            .image
            .clone()
            .or_else(|| env(ENV_DOCKER_IMAGE))
            .or_else(|| file.runner.image.clone())
            .unwrap_or_else(|| RunnerConfig::DEFAULT_IMAGE.to_string());
        let resource_dir = overrides
            .resource_dir
            .clone()
            .or_else(|| env(ENV_RESOURCE_DIR).map(PathBuf::from))
            .or_else(|| file.runner.resource_dir.clone())
            .unwrap_or_else(|| PathBuf::from(RunnerConfig::DEFAULT_RESOURCE_DIR));

        Self {
            mode,
            image,
            resource_dir,
            docker_binary: "docker".to_string(),
        }
    }
}

/// The config file layer: an explicit path must load, the default path is
/// best-effort.
fn load_layer(overrides: &ConfigOverrides) -> Result<Option<ConfigFile>, ConfigError> {
    match overrides.config_path {
        Some(ref path) => load_config(path).map(Some),
        None => Ok(load_config(&config_path()).ok()),
    }
}

/// Explicit values from the command line. Each one wins over every other
/// layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub runner_mode: Option<RunnerMode>,
    pub image: Option<String>,
    pub resource_dir: Option<PathBuf>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub registry_uri: String,
    pub credentials: Credentials,
    pub runner: RunnerConfig,
    /// Base directory under which per-scenario scratch dirs are created.
    /// Always absolute so it can be bind-mounted into a container.
    pub scratch_root: PathBuf,
    pub step_timeout: Duration,
}

impl HarnessConfig {
    pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

    /// Resolve configuration from the process environment and config file.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let file = load_layer(overrides)?;
        let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
        Self::resolve_from(overrides, file.as_ref(), &cwd, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from explicit layers.
    ///
    /// `env` looks up an environment variable by name; `cwd` anchors
    /// relative scratch roots.
    pub fn resolve_from(
        overrides: &ConfigOverrides,
        file: Option<&ConfigFile>,
        cwd: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let default_file = ConfigFile::default();
        let file = file.unwrap_or(&default_file);

        let registry_uri = env(ENV_REGISTRY)
            .or_else(|| file.registry.uri.clone())
            .ok_or(ConfigError::Missing { key: ENV_REGISTRY })?;
        let correct = env(ENV_CORRECT_CREDENTIALS)
            .or_else(|| file.credentials.correct.clone())
            .ok_or(ConfigError::Missing {
                key: ENV_CORRECT_CREDENTIALS,
            })?;
        let incorrect = env(ENV_INCORRECT_CREDENTIALS)
            .or_else(|| file.credentials.incorrect.clone())
            .ok_or(ConfigError::Missing {
                key: ENV_INCORRECT_CREDENTIALS,
            })?;

        let runner = RunnerConfig::resolve_from(overrides, Some(file), &env);

        let scratch_root = env(ENV_SCRATCH_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tmp"));
        let scratch_root = if scratch_root.is_absolute() {
            scratch_root
        } else {
            cwd.join(scratch_root)
        };

        let step_timeout = match env(ENV_STEP_TIMEOUT) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::Invalid {
                        key: ENV_STEP_TIMEOUT,
                        value: raw.clone(),
                        reason: e.to_string(),
                    }
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        key: ENV_STEP_TIMEOUT,
                        value: raw,
                        reason: "must be at least 1 second".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Self::DEFAULT_STEP_TIMEOUT,
        };

        Ok(Self {
            registry_uri,
            credentials: Credentials::new(correct, incorrect),
            runner,
            scratch_root,
            step_timeout,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
