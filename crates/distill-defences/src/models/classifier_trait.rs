use ndarray::{Array2, ArrayD};

use crate::error::Result;
use crate::models::activation::OutputActivation;

/// The capability set the defences rely on. Implementations live next to
/// their model code; the distillation transformer only talks to this trait.
pub trait Classifier {
    /// Predict one output row per sample. Rows are probabilities when
    /// [`Classifier::output_activation`] is `Softmax`, raw logits otherwise.
    ///
    /// `x` holds samples along its first axis; the remaining axes must equal
    /// [`Classifier::input_shape`].
    fn predict(&self, x: &ArrayD<f32>, batch_size: usize) -> Result<Array2<f32>>;

    /// Fit the model against a per-sample target distribution `y` of shape
    /// `(n_samples, nb_classes)`. One-hot rows give ordinary supervised
    /// training, soft rows give distillation.
    fn fit(
        &mut self,
        x: &ArrayD<f32>,
        y: &Array2<f32>,
        batch_size: usize,
        nb_epochs: usize,
    ) -> Result<()>;

    fn nb_classes(&self) -> usize;

    /// Shape of a single sample, without the batch axis.
    fn input_shape(&self) -> &[usize];

    fn output_activation(&self) -> OutputActivation;

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}
