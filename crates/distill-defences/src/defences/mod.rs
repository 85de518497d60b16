//! Defences that transform a classifier into a more robust one.
//!
//! A [`Transformer`] is bound to a trained classifier and, when applied,
//! returns a new classifier. [`Distillation`] is the only transformer
//! provided so far.
pub mod distillation;
pub mod transformer;

pub use distillation::Distillation;
pub use transformer::Transformer;
