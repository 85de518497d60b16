//! Fixed data sets used to pretrain and distill classifiers.
//!
//! `load_digits` generates a small seeded image set standing in for a
//! handwritten-digits benchmark, `load_iris` parses Fisher's iris data from
//! an embedded CSV file. Both return one-hot labels.
use ndarray::{Array2, Array4, ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use statrs::distribution::Normal;

use crate::error::{DefenceError, Result};
use crate::stats::argmax_rows;

pub const DIGITS_CLASSES: usize = 10;
pub const DIGITS_SIDE: usize = 8;
pub const IRIS_CLASSES: usize = 3;
pub const IRIS_SPECIES: [&str; IRIS_CLASSES] = ["setosa", "versicolor", "virginica"];

const IRIS_CSV: &str = include_str!("../data/iris.csv");

#[derive(Debug, Clone)]
pub struct Dataset {
    /// Samples along the first axis.
    pub x: ArrayD<f32>,
    /// One-hot labels, `(n_samples, nb_classes)`.
    pub y: Array2<f32>,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.y.nrows()
    }

    pub fn nb_classes(&self) -> usize {
        self.y.ncols()
    }

    /// Class index of every sample.
    pub fn labels(&self) -> Vec<usize> {
        argmax_rows(&self.y).to_vec()
    }
}

/// One-hot encode class indices.
pub fn one_hot(labels: &[usize], nb_classes: usize) -> Result<Array2<f32>> {
    let mut y = Array2::zeros((labels.len(), nb_classes));
    for (i, &label) in labels.iter().enumerate() {
        if label >= nb_classes {
            return Err(DefenceError::Data(format!(
                "Label {} out of range for {} classes",
                label, nb_classes
            )));
        }
        y[[i, label]] = 1.0;
    }
    Ok(y)
}

/// Synthetic 8x8 single channel digits, channel-last `(n, 8, 8, 1)`.
///
/// Class `c` lights every pixel whose flat index is congruent to `c` modulo
/// 10 with an intensity drawn from `U(0.7, 1.0)`. All other pixels carry
/// `N(0, 0.1)` background noise clipped to `[0, 1]`.
pub fn load_digits(n_samples: usize, seed: u64) -> Result<Dataset> {
    if n_samples == 0 {
        return Err(DefenceError::InvalidParameter(
            "The number of samples must be a positive integer.".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.1).map_err(|e| DefenceError::Data(e.to_string()))?;
    let intensity = Uniform::new_inclusive(0.7f32, 1.0);

    let mut labels: Vec<usize> = (0..n_samples).map(|i| i % DIGITS_CLASSES).collect();
    labels.shuffle(&mut rng);

    let mut x = Array4::<f32>::zeros((n_samples, DIGITS_SIDE, DIGITS_SIDE, 1));
    for (i, &label) in labels.iter().enumerate() {
        for pixel in 0..DIGITS_SIDE * DIGITS_SIDE {
            let value = if pixel % DIGITS_CLASSES == label {
                intensity.sample(&mut rng)
            } else {
                (noise.sample(&mut rng) as f32).clamp(0.0, 1.0)
            };
            x[[i, pixel / DIGITS_SIDE, pixel % DIGITS_SIDE, 0]] = value;
        }
    }

    log::debug!("Generated {} digit samples with seed {}", n_samples, seed);

    Ok(Dataset {
        x: x.into_dyn(),
        y: one_hot(&labels, DIGITS_CLASSES)?,
    })
}

#[derive(Debug, Deserialize)]
struct IrisRecord {
    sepal_length: f32,
    sepal_width: f32,
    petal_length: f32,
    petal_width: f32,
    species: String,
}

/// Fisher's iris data, `(150, 4)` features scaled per column to `[0, 1]`.
pub fn load_iris() -> Result<Dataset> {
    let mut reader = csv::Reader::from_reader(IRIS_CSV.as_bytes());

    let mut features = Vec::new();
    let mut labels = Vec::new();
    for record in reader.deserialize() {
        let record: IrisRecord = record?;
        let label = IRIS_SPECIES
            .iter()
            .position(|s| *s == record.species)
            .ok_or_else(|| DefenceError::Data(format!("Unknown species: {}", record.species)))?;
        features.extend_from_slice(&[
            record.sepal_length,
            record.sepal_width,
            record.petal_length,
            record.petal_width,
        ]);
        labels.push(label);
    }

    let mut x = Array2::from_shape_vec((labels.len(), 4), features)?;
    for mut column in x.columns_mut() {
        let min = column.iter().copied().fold(f32::INFINITY, f32::min);
        let max = column.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = if max > min { max - min } else { 1.0 };
        column.mapv_inplace(|v| (v - min) / range);
    }

    log::trace!("Loaded {} iris samples", labels.len());

    Ok(Dataset {
        x: x.into_dyn(),
        y: one_hot(&labels, IRIS_CLASSES)?,
    })
}

fn permute_4d(x: &ArrayD<f32>, axes: [usize; 4]) -> Result<ArrayD<f32>> {
    if x.ndim() != 4 {
        return Err(DefenceError::InvalidParameter(format!(
            "Expected a 4-D image array, got {} dimensions",
            x.ndim()
        )));
    }
    let permuted = x.view().permuted_axes(IxDyn(&axes));
    Ok(permuted.as_standard_layout().into_owned())
}

/// `(n, h, w, c)` to `(n, c, h, w)`.
pub fn to_channels_first(x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    permute_4d(x, [0, 3, 1, 2])
}

/// `(n, c, h, w)` to `(n, h, w, c)`.
pub fn to_channels_last(x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    permute_4d(x, [0, 2, 3, 1])
}
