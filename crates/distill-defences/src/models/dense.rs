use ndarray::{Array1, Array2, ArrayD, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Result;
use crate::models::activation::{softmax_rows, OutputActivation};
use crate::models::classifier_trait::Classifier;
use crate::models::utils::{
    batch_ranges, check_batch_size, check_input, check_nb_epochs, check_targets, column_sums,
    flatten_samples, glorot_uniform, predict_in_batches, shuffled_indices, soft_cross_entropy,
};

/// Fully connected layer `y = x W + b`.
#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseLayer {
    fn new(rng: &mut StdRng, fan_in: usize, fan_out: usize) -> Self {
        DenseLayer {
            weights: glorot_uniform(rng, fan_in, fan_out),
            bias: Array1::zeros(fan_out),
        }
    }

    fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        x.dot(&self.weights) + &self.bias
    }
}

/// Pre-activation and post-activation values of each layer, kept for backprop.
struct ForwardTrace {
    inputs: Vec<Array2<f32>>,
    pre_activations: Vec<Array2<f32>>,
}

/// Feed-forward classifier on plain ndarray, trained with mini-batch SGD.
///
/// With no hidden layer this is multinomial logistic regression; with a
/// hidden layer it is a ReLU multilayer perceptron. Inputs are flattened in
/// row-major order, so image data is expected channel-last.
pub struct NdarrayClassifier {
    layers: Vec<DenseLayer>,
    input_shape: Vec<usize>,
    nb_classes: usize,
    learning_rate: f32,
    activation: OutputActivation,
    rng: StdRng,
    name: String,
}

impl NdarrayClassifier {
    /// Softmax regression: a single dense layer.
    pub fn linear(
        input_shape: &[usize],
        nb_classes: usize,
        learning_rate: f32,
        activation: OutputActivation,
        seed: u64,
    ) -> Self {
        Self::build(input_shape, &[], nb_classes, learning_rate, activation, seed, "linear")
    }

    /// One ReLU hidden layer of `hidden_units` followed by the output layer.
    pub fn mlp(
        input_shape: &[usize],
        hidden_units: usize,
        nb_classes: usize,
        learning_rate: f32,
        activation: OutputActivation,
        seed: u64,
    ) -> Self {
        Self::build(
            input_shape,
            &[hidden_units],
            nb_classes,
            learning_rate,
            activation,
            seed,
            "mlp",
        )
    }

    fn build(
        input_shape: &[usize],
        hidden: &[usize],
        nb_classes: usize,
        learning_rate: f32,
        activation: OutputActivation,
        seed: u64,
        name: &str,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_features: usize = input_shape.iter().product();

        let mut widths = vec![n_features];
        widths.extend_from_slice(hidden);
        widths.push(nb_classes);

        let layers = widths
            .windows(2)
            .map(|w| DenseLayer::new(&mut rng, w[0], w[1]))
            .collect();

        NdarrayClassifier {
            layers,
            input_shape: input_shape.to_vec(),
            nb_classes,
            learning_rate,
            activation,
            rng,
            name: name.to_string(),
        }
    }

    fn forward_logits(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let last = self.layers.len() - 1;
        let mut out = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            out = layer.forward(out.view());
            if i != last {
                out.mapv_inplace(relu);
            }
        }
        out
    }

    fn forward_trace(&self, x: ArrayView2<f32>) -> (Array2<f32>, ForwardTrace) {
        let last = self.layers.len() - 1;
        let mut trace = ForwardTrace {
            inputs: Vec::with_capacity(self.layers.len()),
            pre_activations: Vec::with_capacity(self.layers.len()),
        };
        let mut out = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(out.view());
            trace.inputs.push(out);
            out = if i != last { z.mapv(relu) } else { z.clone() };
            trace.pre_activations.push(z);
        }
        (out, trace)
    }

    /// One SGD step on a batch; returns the batch loss.
    fn train_step(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let (logits, trace) = self.forward_trace(x);
        let probs = softmax_rows(logits);
        let loss = soft_cross_entropy(&probs, y);

        // Gradient of softmax cross-entropy with respect to the logits.
        let mut delta = (&probs - &y) / x.nrows() as f32;

        for i in (0..self.layers.len()).rev() {
            let grad_w = trace.inputs[i].t().dot(&delta);
            let grad_b = column_sums(&delta);

            if i > 0 {
                let mut upstream = delta.dot(&self.layers[i].weights.t());
                upstream.zip_mut_with(&trace.pre_activations[i - 1], |d, &z| {
                    if z <= 0.0 {
                        *d = 0.0;
                    }
                });
                delta = upstream;
            }

            let layer = &mut self.layers[i];
            layer.weights.scaled_add(-self.learning_rate, &grad_w);
            layer.bias.scaled_add(-self.learning_rate, &grad_b);
        }

        loss
    }
}

fn relu(v: f32) -> f32 {
    v.max(0.0)
}

impl Classifier for NdarrayClassifier {
    fn predict(&self, x: &ArrayD<f32>, batch_size: usize) -> Result<Array2<f32>> {
        check_batch_size(batch_size)?;
        check_input(x, &self.input_shape)?;
        let flat = flatten_samples(x)?;
        predict_in_batches(&flat, batch_size, |batch| {
            Ok(self.activation.apply(self.forward_logits(batch)))
        })
    }

    fn fit(
        &mut self,
        x: &ArrayD<f32>,
        y: &Array2<f32>,
        batch_size: usize,
        nb_epochs: usize,
    ) -> Result<()> {
        check_batch_size(batch_size)?;
        check_nb_epochs(nb_epochs)?;
        let n_samples = check_input(x, &self.input_shape)?;
        check_targets(y, n_samples, self.nb_classes)?;
        let flat = flatten_samples(x)?;

        log::info!(
            "Training {} classifier on {} samples for {} epochs (batch size {})",
            self.name,
            n_samples,
            nb_epochs,
            batch_size
        );

        for epoch in 0..nb_epochs {
            let order = shuffled_indices(n_samples, &mut self.rng);
            let mut total_loss = 0.0;
            let batches = batch_ranges(n_samples, batch_size);
            for range in batches.iter() {
                let idx = &order[range.clone()];
                let x_batch = flat.select(Axis(0), idx);
                let y_batch = y.select(Axis(0), idx);
                total_loss += self.train_step(x_batch.view(), y_batch.view());
            }
            log::debug!(
                "[{}] Epoch {}: Avg. Batch Loss: {:.6}",
                self.name,
                epoch,
                total_loss / batches.len() as f32
            );
        }

        Ok(())
    }

    fn nb_classes(&self) -> usize {
        self.nb_classes
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_activation(&self) -> OutputActivation {
        self.activation
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{all_probability, argmax_rows};
    use ndarray::IxDyn;

    fn toy_data() -> (ArrayD<f32>, Array2<f32>) {
        // Two well separated clusters in 2-D.
        let x = ArrayD::from_shape_vec(
            IxDyn(&[6, 2]),
            vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.1, 0.0, 0.9, 1.1, 0.0, 0.0, 1.2],
        )
        .unwrap();
        let y = Array2::from_shape_fn((6, 2), |(i, j)| if i % 2 == j { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn test_linear_classifier_learns_toy_problem() {
        let (x, y) = toy_data();
        let mut clf = NdarrayClassifier::linear(&[2], 2, 0.5, OutputActivation::Softmax, 7);
        clf.fit(&x, &y, 3, 50).unwrap();
        let preds = clf.predict(&x, 4).unwrap();
        assert!(all_probability(&preds));
        assert_eq!(argmax_rows(&preds).to_vec(), vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_mlp_classifier_learns_toy_problem() {
        let (x, y) = toy_data();
        let mut clf = NdarrayClassifier::mlp(&[2], 8, 2, 0.2, OutputActivation::Softmax, 7);
        clf.fit(&x, &y, 2, 100).unwrap();
        let preds = clf.predict(&x, 6).unwrap();
        assert_eq!(argmax_rows(&preds).to_vec(), vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (x, y) = toy_data();
        let mut a = NdarrayClassifier::mlp(&[2], 4, 2, 0.1, OutputActivation::Linear, 1234);
        let mut b = NdarrayClassifier::mlp(&[2], 4, 2, 0.1, OutputActivation::Linear, 1234);
        a.fit(&x, &y, 2, 3).unwrap();
        b.fit(&x, &y, 2, 3).unwrap();
        assert_eq!(a.predict(&x, 6).unwrap(), b.predict(&x, 6).unwrap());
    }

    #[test]
    fn test_fit_rejects_mismatched_targets() {
        let (x, _) = toy_data();
        let mut clf = NdarrayClassifier::linear(&[2], 2, 0.1, OutputActivation::Softmax, 0);
        let y = Array2::zeros((5, 2));
        assert!(clf.fit(&x, &y, 2, 1).is_err());
        let y = Array2::zeros((6, 2));
        assert!(clf.fit(&x, &y, 0, 1).is_err());
        assert!(clf.fit(&x, &y, 2, 0).is_err());
    }
}
