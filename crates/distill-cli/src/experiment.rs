//! Run one image distillation experiment from a JSON configuration.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use distill_defences::config::{DistillationConfig, ModelConfig};
use distill_defences::defences::{Distillation, Transformer};
use distill_defences::models::candle_mlp::Session;
use distill_defences::stats::{
    argmax_rows, class_indices_as_distribution, cross_entropy, prediction_agreement, DEFAULT_EPS,
};
use distill_defences::zoo::{self, Backend, DIGITS_SAMPLES};

/// Parameters of a distillation experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub backend: Backend,
    /// Explicit model configuration. When absent the backend's defaults are used.
    pub model: Option<ModelConfig>,
    pub distillation: DistillationConfig,
    pub seed: u64,
    /// Number of digit samples to distill on.
    pub n_samples: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Mlp,
            model: None,
            distillation: DistillationConfig::default(),
            seed: 1234,
            n_samples: DIGITS_SAMPLES,
        }
    }
}

impl ExperimentConfig {
    pub fn model_config(&self) -> ModelConfig {
        match &self.model {
            Some(model) => model.clone(),
            None => self.backend.model_config(),
        }
    }

    /// Backend the experiment actually runs on; an explicit model wins.
    pub fn effective_backend(&self) -> Backend {
        Backend::from(&self.model_config().model_type)
    }

    /// Switch backend, dropping an explicit model configuration for another backend.
    pub fn set_backend(&mut self, backend: Backend) {
        if let Some(model) = &self.model {
            if Backend::from(&model.model_type) != backend {
                log::warn!(
                    "Ignoring configured {} model, backend overridden to {}",
                    model.model_type.name(),
                    backend
                );
                self.model = None;
            }
        }
        self.backend = backend;
    }
}

/// Outcome of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub backend: Backend,
    pub seed: u64,
    pub n_samples: usize,
    pub batch_size: usize,
    pub nb_epochs: usize,
    /// Fraction of samples on which both classifiers predict the same class.
    pub agreement: f64,
    /// Cross-entropy between the two argmax index sequences.
    pub cross_entropy: f64,
}

/// Load an experiment configuration from a JSON file.
pub fn load_experiment_config<P: AsRef<Path>>(path: P) -> Result<ExperimentConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: ExperimentConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    Ok(config)
}

/// Pretrain a classifier, distill it into a fresh one and compare the two.
pub fn run_experiment(config: &ExperimentConfig) -> Result<ExperimentReport> {
    let model = config.model_config();
    let backend = config.effective_backend();
    let batch_size = config.distillation.batch_size;

    log::info!(
        "Running {} distillation on {} samples (seed {})",
        backend,
        config.n_samples,
        config.seed
    );

    let session = backend.channels_first().then(Session::cpu);
    let data = zoo::digits(backend, config.n_samples, config.seed)
        .context("Failed to generate digits data")?;

    let trained = zoo::image_classifier_from_config(&model, true, config.seed, session.clone())
        .context("Failed to build trained classifier")?;
    let modified = zoo::image_classifier_from_config(&model, false, config.seed, session)
        .context("Failed to build modified classifier")?;

    let transformer = Distillation::new(trained.as_ref(), config.distillation)?;
    let modified = transformer
        .transform(&data.x, modified)
        .context("Distillation failed")?;

    let preds1 = argmax_rows(&trained.predict(&data.x, batch_size)?);
    let preds2 = argmax_rows(&modified.predict(&data.x, batch_size)?);

    let agreement = prediction_agreement(&preds1, &preds2)?;
    let cross_entropy = cross_entropy(
        &class_indices_as_distribution(&preds1),
        &class_indices_as_distribution(&preds2),
        DEFAULT_EPS,
    )?;

    log::info!(
        "Agreement: {:.4}, argmax cross-entropy: {:.4}",
        agreement,
        cross_entropy
    );

    Ok(ExperimentReport {
        backend,
        seed: config.seed,
        n_samples: config.n_samples,
        batch_size,
        nb_epochs: config.distillation.nb_epochs,
        agreement,
        cross_entropy,
    })
}

pub fn write_report<P: AsRef<Path>>(report: &ExperimentReport, path: P) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write report: {}", path.as_ref().display()))?;
    Ok(())
}
