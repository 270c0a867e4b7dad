//! `npmres run` command: execute feature files and report the results.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use npmres_core::config::{ConfigOverrides, HarnessConfig};
use npmres_core::executor::{
    FeatureReport, ScenarioExecutor, ScenarioFilter, ScenarioStatus, summarize,
};
use npmres_core::feature::Feature;
use npmres_core::registry::NpmCliRegistry;
use npmres_core::runner::create_runner;
use npmres_core::steps::StepEnv;

/// Top-level shape of the `--report` file.
#[derive(Serialize)]
struct RunReport<'a> {
    passed: usize,
    failed: usize,
    features: &'a [FeatureReport],
}

/// Run every feature in `paths`. Returns whether all selected scenarios
/// passed.
///
/// Configuration and feature files are fully resolved and parsed before
/// any scenario starts.
pub async fn run(
    overrides: &ConfigOverrides,
    paths: &[PathBuf],
    filter: &ScenarioFilter,
    report_path: Option<&Path>,
) -> Result<bool> {
    let config = HarnessConfig::resolve(overrides)?;

    let features = paths
        .iter()
        .map(|path| Feature::load(path))
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        runner = config.runner.mode.as_str(),
        registry = %config.registry_uri,
        features = features.len(),
        "starting run"
    );

    let registry = NpmCliRegistry::new(&config.registry_uri, config.credentials.correct());
    let runner = create_runner(&config.runner);
    let env = StepEnv {
        config: Arc::new(config),
        runner,
        registry: Arc::new(registry),
    };
    let executor = ScenarioExecutor::new(env);

    let mut reports = Vec::with_capacity(features.len());
    for feature in &features {
        println!("Feature: {}", feature.name);
        let report = executor.run_feature(feature, filter).await;
        print_feature(&report);
        reports.push(report);
    }

    let total: usize = reports.iter().map(|r| r.scenarios.len()).sum();
    let passed: usize = reports.iter().map(FeatureReport::passed).sum();
    println!("{}", summarize(total, passed));

    if let Some(path) = report_path {
        write_report(path, &reports, passed, total - passed)?;
    }

    Ok(passed == total)
}

fn print_feature(report: &FeatureReport) {
    for outcome in &report.scenarios {
        match &outcome.status {
            ScenarioStatus::Passed => {
                println!("  PASS     {} ({}ms)", outcome.name, outcome.duration_ms);
            }
            ScenarioStatus::Failed { step, line, error } => {
                println!("  FAIL     {} ({}ms)", outcome.name, outcome.duration_ms);
                match (step, line) {
                    (Some(step), Some(line)) => println!("           line {line}: {step}"),
                    _ => println!("           during setup"),
                }
                println!("           {error}");
            }
            ScenarioStatus::TimedOut {
                step,
                line,
                after_secs,
            } => {
                println!("  TIMEOUT  {} ({}ms)", outcome.name, outcome.duration_ms);
                println!("           line {line}: {step} (limit {after_secs}s)");
            }
        }
    }
    println!("  {}", report.summary());
    println!();
}

fn write_report(path: &Path, reports: &[FeatureReport], passed: usize, failed: usize) -> Result<()> {
    let report = RunReport {
        passed,
        failed,
        features: reports,
    };
    let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
    std::fs::write(path, format!("{json}\n"))
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}
