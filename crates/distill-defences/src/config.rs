use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Result;
use crate::models::activation::OutputActivation;
use crate::models::utils::{check_batch_size, check_nb_epochs};

/// Central configuration for classifiers in the crate.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelConfig {
    pub learning_rate: f32,

    #[serde(default)]
    pub activation: OutputActivation,

    pub model_type: ModelType,
}

/// Supported classifier backends and their hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ModelType {
    /// Softmax regression on ndarray.
    Linear,
    /// One hidden ReLU layer on ndarray.
    Mlp { hidden_units: usize },
    /// One hidden ReLU layer on candle, trained with AdamW.
    Candle {
        hidden_units: usize,
        weight_decay: f64,
    },
}

impl ModelType {
    pub fn name(&self) -> &'static str {
        match self {
            ModelType::Linear => "linear",
            ModelType::Mlp { .. } => "mlp",
            ModelType::Candle { .. } => "candle",
        }
    }

    /// Learning rate that trains this backend reliably with its optimiser.
    pub fn default_learning_rate(&self) -> f32 {
        match self {
            ModelType::Linear => 0.5,
            ModelType::Mlp { .. } => 0.2,
            ModelType::Candle { .. } => 0.01,
        }
    }
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::Mlp { hidden_units: 32 }
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(ModelType::Linear),
            "mlp" => Ok(ModelType::Mlp { hidden_units: 32 }),
            "candle" => Ok(ModelType::Candle {
                hidden_units: 32,
                weight_decay: 0.0,
            }),
            _ => Err(format!(
                "Unknown model type: {}. Valid options are: linear, mlp, candle",
                s
            )),
        }
    }
}

impl ModelConfig {
    pub fn new(learning_rate: f32, model_type: ModelType) -> Self {
        Self {
            learning_rate,
            activation: OutputActivation::default(),
            model_type,
        }
    }

    /// Configuration with the backend's default learning rate.
    pub fn for_model(model_type: ModelType) -> Self {
        Self::new(model_type.default_learning_rate(), model_type)
    }

    pub fn with_activation(mut self, activation: OutputActivation) -> Self {
        self.activation = activation;
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::for_model(ModelType::default())
    }
}

/// Parameters of the distillation defence.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct DistillationConfig {
    /// Size of batches used both for prediction and for training.
    pub batch_size: usize,
    /// Number of epochs used to train the transformed classifier.
    pub nb_epochs: usize,
}

impl Default for DistillationConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            nb_epochs: 10,
        }
    }
}

impl DistillationConfig {
    pub fn new(batch_size: usize, nb_epochs: usize) -> Self {
        Self {
            batch_size,
            nb_epochs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_batch_size(self.batch_size)?;
        check_nb_epochs(self.nb_epochs)
    }
}
