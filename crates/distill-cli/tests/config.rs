//! Integration tests for experiment configuration and the experiment runner.

use std::io::Write;

use distill_cli::experiment::{
    load_experiment_config, run_experiment, write_report, ExperimentConfig,
};
use distill_defences::config::{DistillationConfig, ModelConfig, ModelType};
use distill_defences::zoo::Backend;

#[test]
fn experiment_config_default_values() {
    let cfg = ExperimentConfig::default();
    assert_eq!(cfg.backend, Backend::Mlp);
    assert!(cfg.model.is_none());
    assert_eq!(cfg.distillation, DistillationConfig::default());
    assert_eq!(cfg.seed, 1234);
}

#[test]
fn load_partial_config_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiment.json");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, r#"{{"backend": "candle", "distillation": {{"nb_epochs": 2}}}}"#).unwrap();

    let cfg = load_experiment_config(&path).unwrap();
    assert_eq!(cfg.backend, Backend::Candle);
    assert_eq!(cfg.distillation.nb_epochs, 2);
    assert_eq!(cfg.distillation.batch_size, 128);
    assert_eq!(cfg.n_samples, 300);
}

#[test]
fn omitted_and_empty_distillation_blocks_agree() {
    let omitted: ExperimentConfig = serde_json::from_str("{}").unwrap();
    let empty: ExperimentConfig = serde_json::from_str(r#"{"distillation": {}}"#).unwrap();
    assert_eq!(omitted.distillation, empty.distillation);
    assert_eq!(omitted.distillation, ExperimentConfig::default().distillation);
}

#[test]
fn load_invalid_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiment.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = load_experiment_config(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config"));
    assert!(load_experiment_config(dir.path().join("missing.json")).is_err());
}

#[test]
fn explicit_model_selects_backend() {
    let mut cfg = ExperimentConfig {
        model: Some(ModelConfig::for_model(ModelType::Linear)),
        ..Default::default()
    };
    assert_eq!(cfg.effective_backend(), Backend::Linear);

    cfg.set_backend(Backend::Linear);
    assert!(cfg.model.is_some());
    cfg.set_backend(Backend::Candle);
    assert!(cfg.model.is_none());
    assert_eq!(cfg.effective_backend(), Backend::Candle);
}

#[test]
fn run_experiment_and_write_report() {
    let cfg = ExperimentConfig {
        backend: Backend::Linear,
        n_samples: 100,
        distillation: DistillationConfig::new(50, 5),
        ..Default::default()
    };
    let report = run_experiment(&cfg).unwrap();
    assert_eq!(report.backend, Backend::Linear);
    assert!((0.0..=1.0).contains(&report.agreement));
    assert!(report.cross_entropy >= 0.0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    write_report(&report, &path).unwrap();
    let json = std::fs::read_to_string(&path).unwrap();
    assert!(json.contains("\"cross_entropy\""));
}
