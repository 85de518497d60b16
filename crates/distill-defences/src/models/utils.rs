//! Helpers shared by the classifier backends: argument checks, weight
//! initialisation and mini-batch bookkeeping.
use std::ops::Range;

use ndarray::{concatenate, Array1, Array2, ArrayD, ArrayView2, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::error::{DefenceError, Result};

/// Validate `x` against the per-sample shape of a classifier and return the
/// number of samples.
pub fn check_input(x: &ArrayD<f32>, input_shape: &[usize]) -> Result<usize> {
    let shape = x.shape();
    if shape.len() != input_shape.len() + 1 || &shape[1..] != input_shape {
        let mut expected = vec![shape.first().copied().unwrap_or(0)];
        expected.extend_from_slice(input_shape);
        return Err(DefenceError::ShapeMismatch {
            expected,
            found: shape.to_vec(),
        });
    }
    if shape[0] == 0 {
        return Err(DefenceError::EmptyInput);
    }
    Ok(shape[0])
}

pub fn check_targets(y: &Array2<f32>, n_samples: usize, nb_classes: usize) -> Result<()> {
    if y.dim() != (n_samples, nb_classes) {
        return Err(DefenceError::ShapeMismatch {
            expected: vec![n_samples, nb_classes],
            found: y.shape().to_vec(),
        });
    }
    Ok(())
}

pub fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(DefenceError::InvalidParameter(
            "The size of batches must be a positive integer.".to_string(),
        ));
    }
    Ok(())
}

pub fn check_nb_epochs(nb_epochs: usize) -> Result<()> {
    if nb_epochs == 0 {
        return Err(DefenceError::InvalidParameter(
            "The number of epochs must be a positive integer.".to_string(),
        ));
    }
    Ok(())
}

/// Collapse every axis but the first, giving one row per sample in
/// row-major (standard) order.
pub fn flatten_samples(x: &ArrayD<f32>) -> Result<Array2<f32>> {
    let n_samples = x.shape().first().copied().unwrap_or(0);
    let n_features: usize = x.shape().iter().skip(1).product();
    let flat = x
        .as_standard_layout()
        .into_owned()
        .into_shape((n_samples, n_features))?;
    Ok(flat)
}

/// Glorot (Xavier) uniform initialisation for a `(fan_in, fan_out)` matrix.
pub fn glorot_uniform(rng: &mut StdRng, fan_in: usize, fan_out: usize) -> Array2<f32> {
    let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let dist = Uniform::new_inclusive(-bound, bound);
    Array2::from_shape_simple_fn((fan_in, fan_out), || dist.sample(rng))
}

/// Split `0..n` into consecutive ranges of at most `batch_size` elements.
pub fn batch_ranges(n: usize, batch_size: usize) -> Vec<Range<usize>> {
    (0..n)
        .step_by(batch_size.max(1))
        .map(|start| start..(start + batch_size).min(n))
        .collect()
}

/// A fresh random permutation of `0..n`.
pub fn shuffled_indices(n: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices
}

/// Run `forward` over consecutive batches of `x` in parallel and stitch the
/// outputs back together in sample order.
pub fn predict_in_batches<F>(x: &Array2<f32>, batch_size: usize, forward: F) -> Result<Array2<f32>>
where
    F: Fn(ArrayView2<f32>) -> Result<Array2<f32>> + Sync,
{
    let ranges = batch_ranges(x.nrows(), batch_size);
    log::trace!(
        "Predicting {} samples in {} batches of up to {}",
        x.nrows(),
        ranges.len(),
        batch_size
    );

    let outputs = ranges
        .into_par_iter()
        .map(|range| forward(x.slice(ndarray::s![range, ..])))
        .collect::<Result<Vec<Array2<f32>>>>()?;

    let views: Vec<ArrayView2<f32>> = outputs.iter().map(|o| o.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

/// Mean soft cross-entropy of predicted probabilities against targets.
pub fn soft_cross_entropy(probs: &Array2<f32>, targets: ArrayView2<f32>) -> f32 {
    let n = probs.nrows().max(1) as f32;
    let total: f32 = probs
        .iter()
        .zip(targets.iter())
        .map(|(&p, &t)| -t * (p.max(1e-12)).ln())
        .sum();
    total / n
}

/// Column sums, i.e. the bias gradient of a dense layer.
pub fn column_sums(grad: &Array2<f32>) -> Array1<f32> {
    grad.sum_axis(Axis(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;
    use rand::SeedableRng;

    #[test]
    fn test_batch_ranges_cover_all_samples() {
        let ranges = batch_ranges(250, 100);
        assert_eq!(ranges, vec![0..100, 100..200, 200..250]);
        assert_eq!(batch_ranges(3, 100), vec![0..3]);
    }

    #[test]
    fn test_check_input_rejects_wrong_trailing_shape() {
        let x = ArrayD::<f32>::zeros(IxDyn(&[5, 4]));
        assert_eq!(check_input(&x, &[4]).unwrap(), 5);
        assert!(matches!(
            check_input(&x, &[3]),
            Err(DefenceError::ShapeMismatch { .. })
        ));
        let empty = ArrayD::<f32>::zeros(IxDyn(&[0, 4]));
        assert!(matches!(check_input(&empty, &[4]), Err(DefenceError::EmptyInput)));
    }

    #[test]
    fn test_glorot_uniform_is_seeded_and_bounded() {
        let mut rng1 = StdRng::seed_from_u64(1234);
        let mut rng2 = StdRng::seed_from_u64(1234);
        let w1 = glorot_uniform(&mut rng1, 64, 10);
        let w2 = glorot_uniform(&mut rng2, 64, 10);
        assert_eq!(w1, w2);
        let bound = (6.0f32 / 74.0).sqrt();
        assert!(w1.iter().all(|v| v.abs() <= bound));
    }

    #[test]
    fn test_predict_in_batches_keeps_order() {
        let x = Array2::from_shape_fn((7, 2), |(i, j)| (i * 2 + j) as f32);
        let out = predict_in_batches(&x, 3, |batch| Ok(batch.to_owned())).unwrap();
        assert_eq!(out, x);
    }

    #[test]
    fn test_flatten_samples_row_major() {
        let x = ArrayD::from_shape_vec(IxDyn(&[2, 2, 2]), (0..8).map(|v| v as f32).collect())
            .unwrap();
        let flat = flatten_samples(&x).unwrap();
        assert_eq!(flat.dim(), (2, 4));
        assert_eq!(flat.row(1).to_vec(), vec![4.0, 5.0, 6.0, 7.0]);
    }
}
