use ndarray::{Array2, ArrayD};

use crate::config::DistillationConfig;
use crate::defences::transformer::Transformer;
use crate::error::{ClassifierRole, DefenceError, Result};
use crate::models::classifier_trait::Classifier;
use crate::stats::all_probability;

/// Defensive distillation.
///
/// The trained classifier labels the data with its softmax outputs and a
/// second classifier is trained on those soft labels. The trained
/// classifier is borrowed and never modified.
pub struct Distillation<'a> {
    classifier: &'a dyn Classifier,
    config: DistillationConfig,
}

impl<'a> Distillation<'a> {
    /// Create a new distillation transformer
    ///
    /// # Arguments
    ///
    /// * `classifier` - A trained classifier producing probability outputs
    /// * `config` - Batch size and number of epochs used to train the transformed classifier
    ///
    /// # Returns
    ///
    /// The transformer, or an `InvalidParameter` error if the batch size or
    /// number of epochs is zero.
    pub fn new(classifier: &'a dyn Classifier, config: DistillationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Distillation { classifier, config })
    }

    pub fn config(&self) -> &DistillationConfig {
        &self.config
    }

    /// Train `modified` in place on the soft labels of the trained classifier.
    pub fn distill<C>(&self, x: &ArrayD<f32>, modified: &mut C) -> Result<()>
    where
        C: Classifier + ?Sized,
    {
        let batch_size = self.config.batch_size;

        let preds = self.classifier.predict(x, batch_size)?;
        if !all_probability(&preds) {
            return Err(DefenceError::NonProbabilityOutput(ClassifierRole::Trained));
        }

        let modified_preds = modified.predict(x, batch_size)?;
        if !all_probability(&modified_preds) {
            return Err(DefenceError::NonProbabilityOutput(
                ClassifierRole::Transformed,
            ));
        }

        log::info!(
            "Distilling {} classifier into {} classifier on {} samples",
            self.classifier.name(),
            modified.name(),
            preds.nrows()
        );

        modified.fit(x, &preds, batch_size, self.config.nb_epochs)?;

        log::info!(
            "Distillation finished after {} epochs",
            self.config.nb_epochs
        );

        Ok(())
    }
}

impl Transformer for Distillation<'_> {
    fn transform(
        &self,
        x: &ArrayD<f32>,
        mut transformed_classifier: Box<dyn Classifier>,
    ) -> Result<Box<dyn Classifier>> {
        self.distill(x, transformed_classifier.as_mut())?;
        Ok(transformed_classifier)
    }

    fn fit(&mut self, _x: &ArrayD<f32>, _y: Option<&Array2<f32>>) -> Result<()> {
        log::debug!("Distillation has no fitting step");
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        true
    }

    fn classifier(&self) -> &dyn Classifier {
        self.classifier
    }
}
