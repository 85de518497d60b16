use std::sync::{Arc, Weak};

use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{Linear, Module, Optimizer, VarBuilder, VarMap};
use ndarray::{Array2, ArrayD, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{DefenceError, Result};
use crate::models::activation::OutputActivation;
use crate::models::classifier_trait::Classifier;
use crate::models::utils::{
    batch_ranges, check_batch_size, check_input, check_nb_epochs, check_targets,
    flatten_samples, glorot_uniform, predict_in_batches, shuffled_indices,
};

struct SessionInner {
    device: Device,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        log::trace!("Releasing candle session on {:?}", self.device);
    }
}

/// A compute session: the device candle classifiers run on.
///
/// Cloning shares the session. It is released when the last clone, and the
/// last classifier built on it, goes out of scope, on every exit path.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(device: Device) -> Self {
        log::trace!("Opening candle session on {:?}", device);
        Session {
            inner: Arc::new(SessionInner { device }),
        }
    }

    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// A handle that does not keep the session alive.
    pub fn downgrade(&self) -> WeakSession {
        WeakSession(Arc::downgrade(&self.inner))
    }
}

/// Non-owning reference to a [`Session`].
#[derive(Clone)]
pub struct WeakSession(Weak<SessionInner>);

impl WeakSession {
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Hyper-parameters of a [`CandleClassifier`].
#[derive(Debug, Clone)]
pub struct CandleParams {
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub activation: OutputActivation,
}

/// ReLU multilayer perceptron on candle, trained with autograd and AdamW.
///
/// Samples are flattened in row-major order; image data is expected
/// channel-first `(n, c, h, w)`.
pub struct CandleClassifier {
    session: Session,
    varmap: VarMap,
    hidden: Linear,
    output: Linear,
    input_shape: Vec<usize>,
    nb_classes: usize,
    params: CandleParams,
    rng: StdRng,
}

/// Insert seeded Glorot weights and zero biases for a linear layer under
/// `prefix`, so that `candle_nn::linear` picks them up instead of drawing
/// from the unseeded device generator.
fn insert_seeded_linear(
    varmap: &VarMap,
    prefix: &str,
    fan_in: usize,
    fan_out: usize,
    rng: &mut StdRng,
    device: &Device,
) -> Result<()> {
    // candle stores linear weights as (out, in).
    let weights = glorot_uniform(rng, fan_in, fan_out).reversed_axes();
    let weights: Vec<f32> = weights.iter().copied().collect();
    let weights = Tensor::from_vec(weights, (fan_out, fan_in), device)?;
    let bias = Tensor::zeros(fan_out, DType::F32, device)?;

    let mut ws = varmap
        .data()
        .lock()
        .map_err(|_| DefenceError::Backend("variable map lock poisoned".to_string()))?;
    ws.insert(format!("{}.weight", prefix), Var::from_tensor(&weights)?);
    ws.insert(format!("{}.bias", prefix), Var::from_tensor(&bias)?);
    Ok(())
}

fn to_tensor(batch: ArrayView2<f32>, device: &Device) -> Result<Tensor> {
    let data: Vec<f32> = batch.iter().copied().collect();
    Ok(Tensor::from_vec(data, batch.dim(), device)?)
}

impl CandleClassifier {
    pub fn new(
        session: Session,
        input_shape: &[usize],
        nb_classes: usize,
        params: CandleParams,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_features: usize = input_shape.iter().product();
        let device = session.device().clone();

        let varmap = VarMap::new();
        insert_seeded_linear(&varmap, "hidden", n_features, params.hidden_units, &mut rng, &device)?;
        insert_seeded_linear(&varmap, "output", params.hidden_units, nb_classes, &mut rng, &device)?;

        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let hidden = candle_nn::linear(n_features, params.hidden_units, vb.pp("hidden"))?;
        let output = candle_nn::linear(params.hidden_units, nb_classes, vb.pp("output"))?;

        Ok(CandleClassifier {
            session,
            varmap,
            hidden,
            output,
            input_shape: input_shape.to_vec(),
            nb_classes,
            params,
            rng,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let hidden = self.hidden.forward(xs)?.relu()?;
        Ok(self.output.forward(&hidden)?)
    }

    fn logits_to_array(&self, logits: &Tensor) -> Result<Array2<f32>> {
        let (rows, cols) = logits.dims2()?;
        let values = logits.flatten_all()?.to_vec1::<f32>()?;
        Ok(Array2::from_shape_vec((rows, cols), values)?)
    }
}

impl Classifier for CandleClassifier {
    fn predict(&self, x: &ArrayD<f32>, batch_size: usize) -> Result<Array2<f32>> {
        check_batch_size(batch_size)?;
        check_input(x, &self.input_shape)?;
        let flat = flatten_samples(x)?;
        let device = self.session.device();

        predict_in_batches(&flat, batch_size, |batch| {
            let xs = to_tensor(batch, device)?;
            let logits = self.forward(&xs)?;
            Ok(self.params.activation.apply(self.logits_to_array(&logits)?))
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
        let device = self.session.device().clone();

        log::info!(
            "Training candle classifier on {} samples for {} epochs (batch size {})",
            n_samples,
            nb_epochs,
            batch_size
        );

        let adam_params = candle_nn::ParamsAdamW {
            lr: self.params.learning_rate,
            weight_decay: self.params.weight_decay,
            ..Default::default()
        };
        let mut opt = candle_nn::AdamW::new(self.varmap.all_vars(), adam_params)?;

        for epoch in 0..nb_epochs {
            let order = shuffled_indices(n_samples, &mut self.rng);
            let batches = batch_ranges(n_samples, batch_size);
            let mut total_loss = 0.0f32;

            for range in batches.iter() {
                let idx = &order[range.clone()];
                let xs = to_tensor(flat.select(Axis(0), idx).view(), &device)?;
                let targets = to_tensor(y.select(Axis(0), idx).view(), &device)?;

                let logits = self.forward(&xs)?;
                let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
                let loss = (&targets * &log_probs)?.sum(1)?.mean_all()?.neg()?;

                opt.backward_step(&loss)?;
                total_loss += loss.to_scalar::<f32>()?;
            }

            log::debug!(
                "[candle] Epoch {}: Avg. Batch Loss: {:.6}",
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
        self.params.activation
    }

    fn name(&self) -> &str {
        "candle"
    }
}
