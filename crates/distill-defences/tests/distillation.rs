//! End-to-end distillation scenarios on every classifier backend.

use std::panic::{self, AssertUnwindSafe};

use distill_defences::config::DistillationConfig;
use distill_defences::data_handling::load_iris;
use distill_defences::defences::{Distillation, Transformer};
use distill_defences::error::{ClassifierRole, DefenceError};
use distill_defences::models::activation::OutputActivation;
use distill_defences::models::candle_mlp::Session;
use distill_defences::stats::{
    argmax_rows, class_indices_as_distribution, cross_entropy, prediction_agreement, DEFAULT_EPS,
};
use distill_defences::zoo::{self, Backend};

const BATCH_SIZE: usize = 100;
const NB_EPOCHS: usize = 10;
const SEED: u64 = 1234;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config() -> DistillationConfig {
    DistillationConfig::new(BATCH_SIZE, NB_EPOCHS)
}

fn check_image_distillation(backend: Backend, session: Option<Session>) {
    init_logger();
    let data = zoo::digits(backend, zoo::DIGITS_SAMPLES, SEED).unwrap();

    let trained = zoo::image_classifier(backend, true, SEED, session.clone()).unwrap();
    let modified = zoo::image_classifier(backend, false, SEED, session).unwrap();

    let transformer = Distillation::new(trained.as_ref(), config()).unwrap();
    let modified = transformer.transform(&data.x, modified).unwrap();

    let preds1 = argmax_rows(&trained.predict(&data.x, BATCH_SIZE).unwrap());
    let preds2 = argmax_rows(&modified.predict(&data.x, BATCH_SIZE).unwrap());

    let acc = prediction_agreement(&preds1, &preds2).unwrap();
    assert!(acc > 0.5, "{} agreement too low: {}", backend, acc);

    let ce = cross_entropy(
        &class_indices_as_distribution(&preds1),
        &class_indices_as_distribution(&preds2),
        DEFAULT_EPS,
    )
    .unwrap();
    assert!(ce < 10.0, "{} cross-entropy too high: {}", backend, ce);
    assert!(ce >= 0.0);
}

#[test]
fn test_linear_classifier() {
    check_image_distillation(Backend::Linear, None);
}

#[test]
fn test_mlp_classifier() {
    check_image_distillation(Backend::Mlp, None);
}

#[test]
fn test_candle_classifier() {
    let session = Session::cpu();
    let weak = session.downgrade();
    check_image_distillation(Backend::Candle, Some(session));
    assert!(!weak.is_alive(), "session outlived its classifiers");
}

#[test]
fn test_candle_session_released_when_test_body_panics() {
    let session = Session::cpu();
    let weak = session.downgrade();

    let result = panic::catch_unwind(AssertUnwindSafe(move || {
        let _classifier = zoo::image_classifier(Backend::Candle, false, SEED, Some(session)).unwrap();
        panic!("failing assertion");
    }));

    assert!(result.is_err());
    assert!(!weak.is_alive());
}

fn check_iris_non_probability(backend: Backend) {
    init_logger();
    let data = load_iris().unwrap();

    let trained = zoo::iris_classifier(backend, true, OutputActivation::Linear, SEED).unwrap();
    let modified = zoo::iris_classifier(backend, false, OutputActivation::Softmax, SEED).unwrap();

    let transformer = Distillation::new(trained.as_ref(), config()).unwrap();
    let err = match transformer.transform(&data.x, modified) {
        Ok(_) => panic!("{} logits were accepted as probabilities", backend),
        Err(err) => err,
    };

    assert!(err.is_invalid_argument());
    assert!(err
        .to_string()
        .contains("The input trained classifier do not produce probability outputs."));
}

#[test]
fn test_iris_linear_non_probability() {
    check_iris_non_probability(Backend::Linear);
}

#[test]
fn test_iris_candle_non_probability() {
    check_iris_non_probability(Backend::Candle);
}

#[test]
fn test_iris_mlp_non_probability() {
    check_iris_non_probability(Backend::Mlp);
}

#[test]
fn test_transformed_classifier_must_output_probabilities() {
    let data = load_iris().unwrap();
    let trained =
        zoo::iris_classifier(Backend::Linear, true, OutputActivation::Softmax, SEED).unwrap();
    let modified =
        zoo::iris_classifier(Backend::Linear, false, OutputActivation::Linear, SEED).unwrap();

    let transformer = Distillation::new(trained.as_ref(), config()).unwrap();
    let err = transformer.transform(&data.x, modified).err().unwrap();
    assert!(matches!(
        err,
        DefenceError::NonProbabilityOutput(ClassifierRole::Transformed)
    ));
    assert_eq!(
        err.to_string(),
        "The input transformed classifier do not produce probability outputs."
    );
}

#[test]
fn test_transformer_contract() {
    let trained = zoo::iris_classifier(Backend::Mlp, false, OutputActivation::Softmax, SEED).unwrap();
    let mut transformer = Distillation::new(trained.as_ref(), config()).unwrap();
    assert!(transformer.is_fitted());
    assert_eq!(transformer.classifier().name(), "mlp");
    assert_eq!(transformer.config().batch_size, BATCH_SIZE);

    let data = load_iris().unwrap();
    transformer.fit(&data.x, Some(&data.y)).unwrap();
    assert!(transformer.is_fitted());

    assert!(Distillation::new(trained.as_ref(), DistillationConfig::new(0, 1)).is_err());
    assert!(Distillation::new(trained.as_ref(), DistillationConfig::new(1, 0)).is_err());
}

#[test]
fn test_trained_classifier_is_left_untouched() {
    let data = zoo::digits(Backend::Linear, 100, SEED).unwrap();
    let trained = zoo::image_classifier(Backend::Linear, true, SEED, None).unwrap();
    let before = trained.predict(&data.x, BATCH_SIZE).unwrap();

    let modified = zoo::image_classifier(Backend::Linear, false, SEED + 1, None).unwrap();
    let transformer = Distillation::new(trained.as_ref(), config()).unwrap();
    transformer.transform(&data.x, modified).unwrap();

    assert_eq!(trained.predict(&data.x, BATCH_SIZE).unwrap(), before);
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let run = || {
        let data = zoo::digits(Backend::Mlp, 100, SEED).unwrap();
        let trained = zoo::image_classifier(Backend::Mlp, true, SEED, None).unwrap();
        let modified = zoo::image_classifier(Backend::Mlp, false, SEED, None).unwrap();
        let transformer = Distillation::new(trained.as_ref(), config()).unwrap();
        let modified = transformer.transform(&data.x, modified).unwrap();
        modified.predict(&data.x, BATCH_SIZE).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_every_backend_reports_probabilities() {
    for backend in Backend::all() {
        let data = zoo::digits(backend, 10, SEED).unwrap();
        let clf = zoo::image_classifier(backend, false, SEED, None).unwrap();
        let preds = clf.predict(&data.x, 4).unwrap();
        assert_eq!(preds.dim(), (10, 10));
        assert!(distill_defences::stats::all_probability(&preds), "{}", backend);
    }
}
