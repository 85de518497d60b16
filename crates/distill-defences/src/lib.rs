//! distill-defences: defensive distillation for small classifiers.
//!
//! A trained classifier labels data with its softmax outputs and a second
//! classifier is trained on those soft labels
//! ([`defences::Distillation`]). The crate ships the classifier capability
//! and three backends (softmax regression and an MLP on ndarray, an MLP on
//! candle), seeded fixtures and data sets to exercise them, and the metrics
//! used to compare the two classifiers.
pub mod config;
pub mod data_handling;
pub mod defences;
pub mod error;
pub mod models;
pub mod stats;
pub mod zoo;
