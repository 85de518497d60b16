use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Dimension, Zip};

use crate::error::{DefenceError, Result};

/// Default clipping constant for [`cross_entropy`].
pub const DEFAULT_EPS: f64 = 1e-10;

/// Relative tolerance used when checking that a row sums to one.
const PROBABILITY_SUM_RTOL: f64 = 1e-3;
const PROBABILITY_SUM_ATOL: f64 = 1e-8;

/// Compute the average cross-entropy between two distributions.
///
/// `prob1` is clipped into `[eps, 1 - eps]` (on a copy) before taking the
/// natural logarithm, and the result is
///
/// ```text
/// -sum(prob2 * ln(clip(prob1) + eps)) / N
/// ```
///
/// where `N` is the length of the leading axis of `prob1`, not the total
/// number of elements.
///
/// # Arguments
///
/// * `prob1` - The estimated distribution, samples along the first axis.
/// * `prob2` - The reference distribution. It is broadcast to the shape of `prob1`;
///   broadcasting only goes that way, so a `prob1` smaller than `prob2` is a
///   `ShapeMismatch` even where numpy would broadcast both.
/// * `eps` - A small positive amount to avoid taking the log of zero. Above
///   `0.5` the clipping bounds cross and every value becomes `1 - eps`, as
///   `np.clip` does.
///
/// # Returns
///
/// The scalar cross-entropy, or an error when `prob2` cannot be broadcast to
/// `prob1`, when `prob1` has no leading axis or no samples, or when `eps` is
/// not a positive finite number.
pub fn cross_entropy<S1, S2, D1, D2>(
    prob1: &ArrayBase<S1, D1>,
    prob2: &ArrayBase<S2, D2>,
    eps: f64,
) -> Result<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D1: Dimension,
    D2: Dimension,
{
    if !(eps > 0.0 && eps.is_finite()) {
        return Err(DefenceError::InvalidParameter(format!(
            "eps must be a positive number, got {}",
            eps
        )));
    }

    let size = match prob1.shape().first() {
        Some(&n) if n > 0 => n,
        _ => return Err(DefenceError::EmptyInput),
    };

    let weights = prob2
        .broadcast(prob1.raw_dim())
        .ok_or_else(|| DefenceError::ShapeMismatch {
            expected: prob1.shape().to_vec(),
            found: prob2.shape().to_vec(),
        })?;

    let clipped = prob1.mapv(|p| p.max(eps).min(1.0 - eps));
    let total = Zip::from(&clipped)
        .and(&weights)
        .fold(0.0, |acc, &p, &q| acc + q * (p + eps).ln());

    Ok(-total / size as f64)
}

/// Convert class indices (e.g. the output of [`argmax_rows`]) to `f64` so they
/// can be scored with [`cross_entropy`].
pub fn class_indices_as_distribution(indices: &Array1<usize>) -> Array1<f64> {
    indices.mapv(|i| i as f64)
}

/// Check whether a single output row is a probability vector: it sums to one
/// (within `1e-8 + 1e-3`, as `np.isclose`) and every entry lies in `[0, 1]`.
pub fn is_probability(row: ArrayView1<f32>) -> bool {
    if row.is_empty() {
        return false;
    }
    let sum: f64 = row.iter().map(|&v| v as f64).sum();
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min = row.iter().copied().fold(f32::INFINITY, f32::min);

    let is_sum_one = (sum - 1.0).abs() <= PROBABILITY_SUM_ATOL + PROBABILITY_SUM_RTOL;
    is_sum_one && max <= 1.0 && min >= 0.0
}

/// True when every row of `preds` is a probability vector.
pub fn all_probability(preds: &Array2<f32>) -> bool {
    preds.axis_iter(Axis(0)).all(is_probability)
}

/// Index of the largest value of each row. Ties resolve to the first index.
pub fn argmax_rows(preds: &Array2<f32>) -> Array1<usize> {
    preds
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            for (idx, &value) in row.iter().enumerate() {
                if value > row[best] {
                    best = idx;
                }
            }
            best
        })
        .collect()
}

/// Fraction of positions where two label sequences agree.
pub fn prediction_agreement(preds1: &Array1<usize>, preds2: &Array1<usize>) -> Result<f64> {
    if preds1.len() != preds2.len() {
        return Err(DefenceError::ShapeMismatch {
            expected: vec![preds1.len()],
            found: vec![preds2.len()],
        });
    }
    if preds1.is_empty() {
        return Err(DefenceError::EmptyInput);
    }

    let matches = Zip::from(preds1)
        .and(preds2)
        .fold(0usize, |acc, a, b| acc + usize::from(a == b));
    Ok(matches as f64 / preds1.len() as f64)
}
