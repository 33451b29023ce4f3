//! Configuration precedence: defaults < TOML file < environment < per-call options.

use std::collections::HashMap;
use std::time::Duration;

use pixcon_core::{BackendKind, CompareError, CompareOptions, EngineConfig, RunPlan};

const FILE: &str = r#"
output_dir = "reports"
backend_timeout_ms = 30000
skip = ["butteraugli"]

[timeout_overrides_ms]
dssim = 5000

[approximations]
mse_scale = 20000.0
"#;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_file_then_env_then_options() {
    let vars = env(&[
        ("PIXCON_BACKEND_TIMEOUT_MS", "45000"),
        ("PIXCON_SKIP", "vips, perceptualdiff"),
    ]);
    let config = EngineConfig::from_toml_str(FILE)
        .unwrap()
        .apply_env(|key| vars.get(key).cloned())
        .unwrap();

    assert_eq!(config.output_dir.to_str(), Some("reports"));
    assert_eq!(config.backend_timeout(), Duration::from_millis(45_000));
    assert_eq!(config.approximations.mse_scale, 20_000.0);
    // Untouched keys keep their defaults.
    assert_eq!(config.probe_timeout(), Duration::from_millis(5_000));
    assert_eq!(config.approximations.judge_pass_score, 95.0);

    let options = CompareOptions::default()
        .skip(BackendKind::PixelDiff)
        .with_timeout(BackendKind::StructuralSimilarity, Duration::from_millis(750));
    let plan = RunPlan::resolve(&config, &options).unwrap();

    for kind in [
        BackendKind::PixelDiff,
        BackendKind::PerceptualJudge,
        BackendKind::PerceptualDistance,
        BackendKind::StatisticalProfile,
    ] {
        assert!(plan.is_skipped(kind), "{kind} should be skipped");
    }
    assert!(!plan.is_skipped(BackendKind::StructuralSimilarity));
    assert_eq!(plan.timeout_for(BackendKind::StructuralSimilarity), Duration::from_millis(750));
    assert_eq!(plan.timeout_for(BackendKind::PixelDiff), Duration::from_millis(45_000));
}

#[test]
fn test_unknown_backend_name_is_rejected() {
    let err = EngineConfig::from_toml_str("skip = [\"photoshop\"]").unwrap_err();
    assert!(matches!(err, CompareError::Config(ref msg) if msg.contains("photoshop")));

    let vars = env(&[("PIXCON_PROBE_TIMEOUT_MS", "soon")]);
    let err = EngineConfig::default()
        .apply_env(|key| vars.get(key).cloned())
        .unwrap_err();
    assert!(matches!(err, CompareError::Config(_)));
}

#[test]
fn test_config_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixcon.toml");
    std::fs::write(&path, FILE).unwrap();

    let config = EngineConfig::from_toml_file(&path).unwrap();
    assert_eq!(config.backend_timeout_ms, 30_000);
    assert_eq!(
        config.timeout_overrides().unwrap().get(&BackendKind::StructuralSimilarity),
        Some(&Duration::from_millis(5_000))
    );

    let missing = EngineConfig::from_toml_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(missing, CompareError::Config(_)));
}
