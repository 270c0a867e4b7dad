mod invoke_cmd;
mod run_cmd;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use npmres_core::config::{self, ConfigFile, ConfigOverrides, RunnerConfig, RunnerMode};
use npmres_core::executor::ScenarioFilter;
use npmres_core::feature::Step;
use npmres_core::runner::ResourceCommand;

#[derive(Parser)]
#[command(name = "npmres", about = "Acceptance test harness for the npm CI resource")]
struct Cli {
    /// Config file (defaults to ~/.config/npmres/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run feature files against the resource
    Run {
        /// Feature files to run
        #[arg(required = true)]
        features: Vec<PathBuf>,
        #[command(flatten)]
        runner: RunnerArgs,
        /// Only run scenarios whose name contains this text
        #[arg(long)]
        name: Option<String>,
        /// Only run scenarios carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Write a JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Invoke a single resource command with a request file
    Invoke {
        /// Resource command: check, in or out
        command: ResourceCommand,
        /// JSON request to send on stdin
        #[arg(long)]
        request: PathBuf,
        /// Directory passed to the resource (defaults to a fresh scratch dir)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[command(flatten)]
        runner: RunnerArgs,
    },
    /// List the step phrases understood in feature files
    Steps,
    /// Write a config file skeleton
    Init {
        /// Registry URL to record in the config
        #[arg(long, default_value = "http://localhost:4873")]
        registry: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct RunnerArgs {
    /// How to launch the resource (overrides TEST_RUNNER)
    #[arg(long, value_enum)]
    runner: Option<RunnerChoice>,
    /// Resource image for the docker runner (overrides DOCKER_IMAGE)
    #[arg(long)]
    image: Option<String>,
    /// Directory holding check/in/out for the local runner
    #[arg(long)]
    resource_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum RunnerChoice {
    Docker,
    Local,
}

impl From<RunnerChoice> for RunnerMode {
    fn from(choice: RunnerChoice) -> Self {
        match choice {
            RunnerChoice::Docker => RunnerMode::Docker,
            RunnerChoice::Local => RunnerMode::Local,
        }
    }
}

fn overrides(config_path: Option<PathBuf>, runner: RunnerArgs) -> ConfigOverrides {
    ConfigOverrides {
        config_path,
        runner_mode: runner.runner.map(RunnerMode::from),
        image: runner.image,
        resource_dir: runner.resource_dir,
    }
}

/// Execute the `npmres init` command: write a config file skeleton.
fn cmd_init(path: Option<PathBuf>, registry: &str, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config::config_path);

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mut cfg = ConfigFile::default();
    cfg.registry.uri = Some(registry.to_string());
    cfg.runner.mode = Some(RunnerMode::Docker.as_str().to_string());
    cfg.runner.image = Some(RunnerConfig::DEFAULT_IMAGE.to_string());

    config::save_config(&path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  registry.uri = {registry}");
    println!("  runner.mode  = docker");
    println!();
    println!(
        "Next: add [credentials] correct/incorrect to the file, or export {} and {}.",
        config::ENV_CORRECT_CREDENTIALS,
        config::ENV_INCORRECT_CREDENTIALS
    );

    Ok(())
}

/// Execute the `npmres steps` command.
fn cmd_steps() {
    for phrase in Step::vocabulary() {
        println!("{phrase}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            features,
            runner,
            name,
            tag,
            report,
        } => {
            let overrides = overrides(cli.config, runner);
            let filter = ScenarioFilter { name, tag };
            let all_passed = run_cmd::run(&overrides, &features, &filter, report.as_deref()).await?;
            if !all_passed {
                std::process::exit(1);
            }
        }
        Commands::Invoke {
            command,
            request,
            dir,
            runner,
        } => {
            let overrides = overrides(cli.config, runner);
            let succeeded =
                invoke_cmd::run(&overrides, command, &request, dir.as_deref()).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Steps => cmd_steps(),
        Commands::Init { registry, force } => {
            cmd_init(cli.config, &registry, force)?;
        }
    }

    Ok(())
}
