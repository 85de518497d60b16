pub mod activation;
pub mod candle_mlp;
pub mod classifier_trait;
pub mod dense;
pub mod factory;
pub mod utils;
