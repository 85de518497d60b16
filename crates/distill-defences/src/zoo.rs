//! Seeded classifier fixtures for the digits and iris data.
//!
//! With `load_init` a classifier comes back pretrained on the data set with
//! a fixed recipe, otherwise freshly initialised. Every fixture takes its
//! seed explicitly so repeated runs build identical models.
use std::fmt;
use std::str::FromStr;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, ModelType};
use crate::data_handling::{
    load_digits, load_iris, to_channels_first, Dataset, DIGITS_CLASSES, DIGITS_SIDE, IRIS_CLASSES,
};
use crate::error::Result;
use crate::models::activation::OutputActivation;
use crate::models::candle_mlp::Session;
use crate::models::classifier_trait::Classifier;
use crate::models::factory::build_classifier;

/// Number of digit samples the image fixtures are pretrained on.
pub const DIGITS_SAMPLES: usize = 300;
pub const HIDDEN_UNITS: usize = 32;
pub const PRETRAIN_BATCH_SIZE: usize = 50;
pub const PRETRAIN_EPOCHS: usize = 20;

/// The classifier backends the fixtures can be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Linear,
    Mlp,
    Candle,
}

impl Backend {
    pub fn all() -> [Backend; 3] {
        [Backend::Linear, Backend::Mlp, Backend::Candle]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Linear => "linear",
            Backend::Mlp => "mlp",
            Backend::Candle => "candle",
        }
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            Backend::Linear => ModelType::Linear,
            Backend::Mlp => ModelType::Mlp {
                hidden_units: HIDDEN_UNITS,
            },
            Backend::Candle => ModelType::Candle {
                hidden_units: HIDDEN_UNITS,
                weight_decay: 0.0,
            },
        }
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::for_model(self.model_type())
    }

    /// Candle classifiers take images channel-first, the ndarray ones channel-last.
    pub fn channels_first(&self) -> bool {
        matches!(self, Backend::Candle)
    }

    pub fn image_input_shape(&self) -> Vec<usize> {
        if self.channels_first() {
            vec![1, DIGITS_SIDE, DIGITS_SIDE]
        } else {
            vec![DIGITS_SIDE, DIGITS_SIDE, 1]
        }
    }

    /// Bring channel-last images into the layout this backend expects.
    pub fn prepare_images(&self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        if self.channels_first() {
            to_channels_first(x)
        } else {
            Ok(x.clone())
        }
    }
}

impl From<&ModelType> for Backend {
    fn from(model_type: &ModelType) -> Self {
        match model_type {
            ModelType::Linear => Backend::Linear,
            ModelType::Mlp { .. } => Backend::Mlp,
            ModelType::Candle { .. } => Backend::Candle,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let model_type: ModelType = s.parse()?;
        Ok(Backend::from(&model_type))
    }
}

/// Digits data in the layout of `backend`.
pub fn digits(backend: Backend, n_samples: usize, seed: u64) -> Result<Dataset> {
    let data = load_digits(n_samples, seed)?;
    Ok(Dataset {
        x: backend.prepare_images(&data.x)?,
        y: data.y,
    })
}

fn pretrain(classifier: &mut dyn Classifier, data: &Dataset) -> Result<()> {
    log::debug!(
        "Pretraining {} classifier on {} samples",
        classifier.name(),
        data.n_samples()
    );
    classifier.fit(&data.x, &data.y, PRETRAIN_BATCH_SIZE, PRETRAIN_EPOCHS)
}

/// Image classifier built from an explicit model configuration.
pub fn image_classifier_from_config(
    config: &ModelConfig,
    load_init: bool,
    seed: u64,
    session: Option<Session>,
) -> Result<Box<dyn Classifier>> {
    let backend = Backend::from(&config.model_type);
    let mut classifier = build_classifier(
        config,
        &backend.image_input_shape(),
        DIGITS_CLASSES,
        seed,
        session,
    )?;

    if load_init {
        let data = digits(backend, DIGITS_SAMPLES, seed)?;
        pretrain(classifier.as_mut(), &data)?;
    }

    Ok(classifier)
}

/// Image classifier for the digits data.
///
/// # Arguments
///
/// * `backend` - Backend to build the classifier on
/// * `load_init` - Pretrain the classifier instead of returning a fresh one
/// * `seed` - Seed for initialisation, shuffling and pretraining data
/// * `session` - Existing session to reuse; only used by the candle backend
pub fn image_classifier(
    backend: Backend,
    load_init: bool,
    seed: u64,
    session: Option<Session>,
) -> Result<Box<dyn Classifier>> {
    image_classifier_from_config(&backend.model_config(), load_init, seed, session)
}

/// Classifier for the iris data with the given output activation.
pub fn iris_classifier(
    backend: Backend,
    load_init: bool,
    activation: OutputActivation,
    seed: u64,
) -> Result<Box<dyn Classifier>> {
    let config = backend.model_config().with_activation(activation);
    let mut classifier = build_classifier(&config, &[4], IRIS_CLASSES, seed, None)?;

    if load_init {
        let data = load_iris()?;
        pretrain(classifier.as_mut(), &data)?;
    }

    Ok(classifier)
}
