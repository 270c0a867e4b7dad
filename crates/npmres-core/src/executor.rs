//! Scenario execution.
//!
//! Scenarios run one after another. Each gets a fresh
//! [`ScenarioContext`]; its steps run in order until the first failure,
//! each bounded by the step timeout; teardown always runs afterwards.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::feature::{Feature, Scenario, ScenarioStep};
use crate::scenario::ScenarioContext;
use crate::steps::{self, StepEnv};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed {
        /// The failing step, or `None` if the scenario could not be set up.
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        line: Option<usize>,
        error: String,
    },
    TimedOut {
        step: String,
        line: usize,
        after_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    /// Scenario id used in logs; `None` if setup failed before one was
    /// assigned.
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(flatten)]
    pub status: ScenarioStatus,
    pub duration_ms: i64,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureReport {
    pub feature: String,
    pub scenarios: Vec<ScenarioOutcome>,
}

impl FeatureReport {
    pub fn passed(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.scenarios.len() - self.passed()
    }

    /// `N scenarios (P passed, F failed)`.
    pub fn summary(&self) -> String {
        summarize(self.scenarios.len(), self.passed())
    }
}

/// One-line summary over several reports.
pub fn summarize(total: usize, passed: usize) -> String {
    let noun = if total == 1 { "scenario" } else { "scenarios" };
    format!(
        "{total} {noun} ({passed} passed, {} failed)",
        total - passed
    )
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Selects which scenarios of a feature to run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioFilter {
    /// Substring the scenario name must contain.
    pub name: Option<String>,
    /// Tag (without `@`) the scenario must carry.
    pub tag: Option<String>,
}

impl ScenarioFilter {
    pub fn matches(&self, scenario: &Scenario) -> bool {
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|needle| scenario.name.contains(needle));
        let tag_ok = self
            .tag
            .as_deref()
            .is_none_or(|tag| scenario.tags.iter().any(|t| t == tag.trim_start_matches('@')));
        name_ok && tag_ok
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScenarioExecutor {
    scratch_root: PathBuf,
    step_timeout: Duration,
    env: StepEnv,
}

impl ScenarioExecutor {
    /// Build an executor using the scratch root and step timeout from the
    /// environment's config.
    pub fn new(env: StepEnv) -> Self {
        Self {
            scratch_root: env.config.scratch_root.clone(),
            step_timeout: env.config.step_timeout,
            env,
        }
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Run every scenario of `feature` accepted by `filter`, in order.
    pub async fn run_feature(&self, feature: &Feature, filter: &ScenarioFilter) -> FeatureReport {
        let mut scenarios = Vec::new();
        for scenario in feature.scenarios.iter().filter(|s| filter.matches(s)) {
            scenarios.push(self.run_scenario(scenario).await);
        }
        FeatureReport {
            feature: feature.name.clone(),
            scenarios,
        }
    }

    /// Run one scenario from setup to teardown.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioOutcome {
        let start = Instant::now();
        let elapsed_ms = |start: Instant| i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

        let mut ctx = match ScenarioContext::setup(&self.scratch_root) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!(scenario = %scenario.name, error = %format!("{e:#}"), "scenario setup failed");
                return ScenarioOutcome {
                    id: None,
                    name: scenario.name.clone(),
                    status: ScenarioStatus::Failed {
                        step: None,
                        line: None,
                        error: format!("{e:#}"),
                    },
                    duration_ms: elapsed_ms(start),
                };
            }
        };

        let id = ctx.id();
        tracing::info!(scenario = %scenario.name, id = %id, "scenario started");
        let status = self.run_steps(&scenario.steps, &mut ctx).await;
        ctx.teardown();

        match &status {
            ScenarioStatus::Passed => tracing::info!(scenario = %scenario.name, "scenario passed"),
            ScenarioStatus::Failed { error, .. } => {
                tracing::warn!(scenario = %scenario.name, error = %error, "scenario failed")
            }
            ScenarioStatus::TimedOut { step, .. } => {
                tracing::warn!(scenario = %scenario.name, step = %step, "scenario timed out")
            }
        }

        ScenarioOutcome {
            id: Some(id),
            name: scenario.name.clone(),
            status,
            duration_ms: elapsed_ms(start),
        }
    }

    async fn run_steps(&self, steps: &[ScenarioStep], ctx: &mut ScenarioContext) -> ScenarioStatus {
        for step in steps {
            tracing::debug!(id = %ctx.id(), line = step.line, step = %step, "executing step");
            let result =
                tokio::time::timeout(self.step_timeout, steps::execute(&step.step, ctx, &self.env))
                    .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return ScenarioStatus::Failed {
                        step: Some(step.to_string()),
                        line: Some(step.line),
                        error: format!("{e:#}"),
                    };
                }
                // The step future (and any child it spawned) is dropped here.
                Err(_) => {
                    return ScenarioStatus::TimedOut {
                        step: step.to_string(),
                        line: step.line,
                        after_secs: self.step_timeout.as_secs(),
                    };
                }
            }
        }
        ScenarioStatus::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(name: &str, tags: &[&str]) -> Scenario {
        Scenario {
            name: name.to_string(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            steps: Vec::new(),
        }
    }

    #[test]
    fn filter_by_name_and_tag() {
        let s = scenario("check latest version", &["smoke", "registry"]);

        assert!(ScenarioFilter::default().matches(&s));
        let by_name = ScenarioFilter {
            name: Some("latest".to_string()),
            tag: None,
        };
        assert!(by_name.matches(&s));
        let by_tag = ScenarioFilter {
            name: None,
            tag: Some("@smoke".to_string()),
        };
        assert!(by_tag.matches(&s));
        let both_wrong = ScenarioFilter {
            name: Some("publish".to_string()),
            tag: Some("smoke".to_string()),
        };
        assert!(!both_wrong.matches(&s));
    }

    #[test]
    fn summary_counts() {
        let outcome = |status| ScenarioOutcome {
            id: None,
            name: "s".to_string(),
            status,
            duration_ms: 0,
        };
        let report = FeatureReport {
            feature: "f".to_string(),
            scenarios: vec![
                outcome(ScenarioStatus::Passed),
                outcome(ScenarioStatus::TimedOut {
                    step: "When the resource is checked".to_string(),
                    line: 4,
                    after_secs: 30,
                }),
            ],
        };
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.summary(), "2 scenarios (1 passed, 1 failed)");
        assert_eq!(summarize(1, 1), "1 scenario (1 passed, 0 failed)");
    }

    #[test]
    fn outcome_serializes_status_inline() {
        let outcome = ScenarioOutcome {
            id: None,
            name: "s".to_string(),
            status: ScenarioStatus::Failed {
                step: Some("Then an error is returned".to_string()),
                line: Some(7),
                error: "expected a non-zero exit code".to_string(),
            },
            duration_ms: 12,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["line"], 7);
        assert_eq!(value["duration_ms"], 12);
    }
}
