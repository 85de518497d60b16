use crate::config::{ModelConfig, ModelType};
use crate::error::Result;
use crate::models::candle_mlp::{CandleClassifier, CandleParams, Session};
use crate::models::classifier_trait::Classifier;
use crate::models::dense::NdarrayClassifier;

/// Build a boxed classifier from a `ModelConfig`.
///
/// `session` is only used by the candle backend; when it is `None` a new CPU
/// session is opened for the classifier.
pub fn build_classifier(
    params: &ModelConfig,
    input_shape: &[usize],
    nb_classes: usize,
    seed: u64,
    session: Option<Session>,
) -> Result<Box<dyn Classifier>> {
    log::trace!(
        "Building {} classifier for input shape {:?} with seed {}",
        params.model_type.name(),
        input_shape,
        seed
    );

    let model: Box<dyn Classifier> = match params.model_type {
        ModelType::Linear => Box::new(NdarrayClassifier::linear(
            input_shape,
            nb_classes,
            params.learning_rate,
            params.activation,
            seed,
        )),
        ModelType::Mlp { hidden_units } => Box::new(NdarrayClassifier::mlp(
            input_shape,
            hidden_units,
            nb_classes,
            params.learning_rate,
            params.activation,
            seed,
        )),
        ModelType::Candle {
            hidden_units,
            weight_decay,
        } => {
            let candle_params = CandleParams {
                hidden_units,
                learning_rate: params.learning_rate as f64,
                weight_decay,
                activation: params.activation,
            };
            Box::new(CandleClassifier::new(
                session.unwrap_or_else(Session::cpu),
                input_shape,
                nb_classes,
                candle_params,
                seed,
            )?)
        }
    };

    Ok(model)
}
