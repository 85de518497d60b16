use ndarray::{Array2, ArrayD};

use crate::error::Result;
use crate::models::classifier_trait::Classifier;

/// A defence that turns one classifier into another.
pub trait Transformer {
    /// Apply the defence to `x`, training `transformed_classifier` and
    /// handing it back.
    fn transform(
        &self,
        x: &ArrayD<f32>,
        transformed_classifier: Box<dyn Classifier>,
    ) -> Result<Box<dyn Classifier>>;

    /// Fit the transformer itself. Most defences need no fitting.
    fn fit(&mut self, _x: &ArrayD<f32>, _y: Option<&Array2<f32>>) -> Result<()> {
        Ok(())
    }

    fn is_fitted(&self) -> bool;

    /// The classifier the transformer was built from.
    fn classifier(&self) -> &dyn Classifier;
}
