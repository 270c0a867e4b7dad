//! The feature files shipped in `features/` parse, and pass against the
//! fake resource and registry.

#![cfg(unix)]

use std::path::PathBuf;

use npmres_core::executor::{ScenarioFilter, ScenarioStatus};
use npmres_core::feature::Feature;
use npmres_test_utils::TestHarness;

fn feature_files() -> Vec<PathBuf> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../features");
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", dir.display()))
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "feature"))
        .collect();
    files.sort();
    files
}

#[test]
fn bundled_features_parse() {
    let files = feature_files();
    assert_eq!(files.len(), 3, "files: {files:?}");
    for path in files {
        let feature = Feature::load(&path).unwrap_or_else(|e| panic!("{e:#}"));
        assert!(!feature.scenarios.is_empty(), "{} has no scenarios", path.display());
    }
}

#[tokio::test]
async fn bundled_features_pass_against_fakes() {
    let harness = TestHarness::new().unwrap();
    let executor = harness.executor();

    for path in feature_files() {
        let feature = Feature::load(&path).unwrap();
        let report = executor
            .run_feature(&feature, &ScenarioFilter::default())
            .await;
        for outcome in &report.scenarios {
            assert_eq!(
                outcome.status,
                ScenarioStatus::Passed,
                "{}: scenario {:?}",
                path.display(),
                outcome.name
            );
        }
    }
    assert!(harness.leftover_scratch_dirs().is_empty());
}

#[tokio::test]
async fn private_tag_selects_credential_scenarios() {
    let harness = TestHarness::new().unwrap();
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../features/check.feature");
    let feature = Feature::load(&path).unwrap();

    let filter = ScenarioFilter {
        name: None,
        tag: Some("private".to_string()),
    };
    let report = harness.executor().run_feature(&feature, &filter).await;

    assert_eq!(report.scenarios.len(), 3);
    assert_eq!(report.passed(), 3);
}
