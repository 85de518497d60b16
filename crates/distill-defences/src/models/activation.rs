use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a classifier's `predict` returns.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputActivation {
    /// Row-wise softmax probabilities.
    #[default]
    Softmax,
    /// Raw logits.
    Linear,
}

impl OutputActivation {
    pub fn apply(&self, logits: Array2<f32>) -> Array2<f32> {
        match self {
            OutputActivation::Softmax => softmax_rows(logits),
            OutputActivation::Linear => logits,
        }
    }
}

impl FromStr for OutputActivation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "softmax" => Ok(OutputActivation::Softmax),
            "linear" | "logits" => Ok(OutputActivation::Linear),
            _ => Err(format!(
                "Unknown output activation: {}. Valid options are: softmax, linear",
                s
            )),
        }
    }
}

/// Numerically stable softmax over each row, in place.
pub fn softmax_rows(mut logits: Array2<f32>) -> Array2<f32> {
    for mut row in logits.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    logits
}
