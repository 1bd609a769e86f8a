//! Burn approximators
//!
//! [`BurnPolicy`] and [`BurnCritic`] wrap the actor and critic modules on an
//! autodiff ndarray backend, each with its own Adam optimizer, and expose
//! them through the approximator traits.

use burn::backend::Autodiff;
use burn::module::{AutodiffModule, ModuleMapper, ModuleVisitor, ParamId};
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::{ElementConversion, TensorData};
use burn_ndarray::NdArray;
use tracing::{info, warn};

use super::actor::{Actor, ActorConfig};
use super::approximator::{Approximator, PolicyApproximator, ValueApproximator};
use super::critic::{Critic, CriticConfig};
use crate::config::NetworkConfig;
use crate::core::{Observation, ObservationBatch, ACTION_DIM, UTILITY_FEATURES};
use crate::error::{Result, RlError};

/// Backend used for inference
pub type InferenceBackend = NdArray<f32>;

/// Backend used for training
pub type TrainingBackend = Autodiff<InferenceBackend>;

type Dev = <TrainingBackend as Backend>::Device;

/// Local and target networks for both roles
pub struct Networks<PO, CO> {
    pub actor_local: BurnPolicy<PO>,
    pub actor_target: BurnPolicy<PO>,
    pub critic_local: BurnCritic<CO>,
    pub critic_target: BurnCritic<CO>,
}

/// Build the four networks for observations with `series_len` window features
///
/// Targets are initialized independently; the learner copies the locals
/// into them before the first step.
pub fn build_networks(
    config: &NetworkConfig,
    series_len: usize,
    seed: Option<u64>,
) -> Result<
    Networks<
        impl Optimizer<Actor<TrainingBackend>, TrainingBackend>,
        impl Optimizer<Critic<TrainingBackend>, TrainingBackend>,
    >,
> {
    if series_len == 0 {
        return Err(RlError::Configuration(
            "networks need a non-empty price window".to_string(),
        ));
    }
    if let Some(seed) = seed {
        TrainingBackend::seed(seed);
    }

    let device = Dev::default();
    let actor = ActorConfig::new(
        series_len,
        config.actor_series_layers.clone(),
        config.actor_utility_layers.clone(),
        config.actor_combined_layers.clone(),
    );
    let critic = CriticConfig::new(
        series_len,
        config.critic_series_layers.clone(),
        config.critic_utility_layers.clone(),
        config.critic_combined_layers.clone(),
        config.critic_action_layers.clone(),
        config.critic_final_layers.clone(),
    );

    let networks = Networks {
        actor_local: BurnPolicy::new(
            actor.init(&device),
            AdamConfig::new().init(),
            config.actor_lr,
            series_len,
            device.clone(),
        ),
        actor_target: BurnPolicy::new(
            actor.init(&device),
            AdamConfig::new().init(),
            config.actor_lr,
            series_len,
            device.clone(),
        ),
        critic_local: BurnCritic::new(
            critic.init(&device),
            AdamConfig::new().init(),
            config.critic_lr,
            series_len,
            device.clone(),
        ),
        critic_target: BurnCritic::new(
            critic.init(&device),
            AdamConfig::new().init(),
            config.critic_lr,
            series_len,
            device,
        ),
    };

    info!(
        series_len,
        actor_params = networks.actor_local.parameter_count(),
        critic_params = networks.critic_local.parameter_count(),
        "Networks initialized"
    );
    Ok(networks)
}

/// Actor on the autodiff backend
pub struct BurnPolicy<O> {
    model: Actor<TrainingBackend>,
    optimizer: O,
    lr: f64,
    series_len: usize,
    device: Dev,
}

impl<O> BurnPolicy<O>
where
    O: Optimizer<Actor<TrainingBackend>, TrainingBackend>,
{
    pub fn new(
        model: Actor<TrainingBackend>,
        optimizer: O,
        lr: f64,
        series_len: usize,
        device: Dev,
    ) -> Self {
        Self {
            model,
            optimizer,
            lr,
            series_len,
            device,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.model.num_params()
    }

    fn forward_inference(&self, states: &ObservationBatch) -> Result<Vec<f32>> {
        let (series, utility) =
            state_tensors::<InferenceBackend>(states, self.series_len, &self.device)?;
        to_vec(self.model.valid().forward(series, utility))
    }
}

impl<O> Approximator for BurnPolicy<O>
where
    O: Optimizer<Actor<TrainingBackend>, TrainingBackend>,
{
    fn parameters(&self) -> Vec<f32> {
        flatten(&self.model)
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        check_len(self.model.num_params(), params.len())?;
        self.model = self.model.clone().map(&mut ParamLoader::new(params));
        Ok(())
    }
}

impl<O> PolicyApproximator for BurnPolicy<O>
where
    O: Optimizer<Actor<TrainingBackend>, TrainingBackend>,
{
    fn predict(&self, observation: &Observation) -> Result<[f32; ACTION_DIM]> {
        let probs = self.forward_inference(&ObservationBatch::single(observation))?;
        check_len(ACTION_DIM, probs.len())?;
        Ok([probs[0], probs[1]])
    }

    fn predict_batch(&self, states: &ObservationBatch) -> Result<Vec<f32>> {
        self.forward_inference(states)
    }

    fn train_with_action_gradients(
        &mut self,
        states: &ObservationBatch,
        action_gradients: &[f32],
    ) -> Result<f64> {
        let n = states.len();
        check_len(n * ACTION_DIM, action_gradients.len())?;

        let (series, utility) =
            state_tensors::<TrainingBackend>(states, self.series_len, &self.device)?;
        let gradients = matrix::<TrainingBackend>(action_gradients, n, ACTION_DIM, &self.device);

        // Ascend Q: minimize the negated gradient-weighted probabilities
        let probs = self.model.forward(series, utility);
        let loss = -(probs * gradients).sum_dim(1).mean();
        let value = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optimizer.step(self.lr, self.model.clone(), grads);
        Ok(value)
    }
}

/// Critic on the autodiff backend
pub struct BurnCritic<O> {
    model: Critic<TrainingBackend>,
    optimizer: O,
    lr: f64,
    series_len: usize,
    device: Dev,
}

impl<O> BurnCritic<O>
where
    O: Optimizer<Critic<TrainingBackend>, TrainingBackend>,
{
    pub fn new(
        model: Critic<TrainingBackend>,
        optimizer: O,
        lr: f64,
        series_len: usize,
        device: Dev,
    ) -> Self {
        Self {
            model,
            optimizer,
            lr,
            series_len,
            device,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.model.num_params()
    }
}

impl<O> Approximator for BurnCritic<O>
where
    O: Optimizer<Critic<TrainingBackend>, TrainingBackend>,
{
    fn parameters(&self) -> Vec<f32> {
        flatten(&self.model)
    }

    fn set_parameters(&mut self, params: &[f32]) -> Result<()> {
        check_len(self.model.num_params(), params.len())?;
        self.model = self.model.clone().map(&mut ParamLoader::new(params));
        Ok(())
    }
}

impl<O> ValueApproximator for BurnCritic<O>
where
    O: Optimizer<Critic<TrainingBackend>, TrainingBackend>,
{
    fn predict_batch(&self, states: &ObservationBatch, actions: &[f32]) -> Result<Vec<f32>> {
        let n = states.len();
        check_len(n * ACTION_DIM, actions.len())?;
        let (series, utility) =
            state_tensors::<InferenceBackend>(states, self.series_len, &self.device)?;
        let actions = matrix::<InferenceBackend>(actions, n, ACTION_DIM, &self.device);
        to_vec(self.model.valid().q_value(series, utility, actions))
    }

    fn train_on_batch(
        &mut self,
        states: &ObservationBatch,
        actions: &[f32],
        targets: &[f32],
    ) -> Result<f64> {
        let n = states.len();
        check_len(n * ACTION_DIM, actions.len())?;
        check_len(n, targets.len())?;

        let (series, utility) =
            state_tensors::<TrainingBackend>(states, self.series_len, &self.device)?;
        let actions = matrix::<TrainingBackend>(actions, n, ACTION_DIM, &self.device);
        let targets = Tensor::<TrainingBackend, 1>::from_data(
            TensorData::new(targets.to_vec(), [n]),
            &self.device,
        );

        let q = self.model.q_value(series, utility, actions);
        let loss = MseLoss::new().forward(q, targets, Reduction::Mean);
        let value = loss.clone().into_scalar().elem::<f64>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optimizer.step(self.lr, self.model.clone(), grads);
        Ok(value)
    }

    fn action_gradients(&self, states: &ObservationBatch, actions: &[f32]) -> Result<Vec<f32>> {
        let n = states.len();
        check_len(n * ACTION_DIM, actions.len())?;

        let (series, utility) =
            state_tensors::<TrainingBackend>(states, self.series_len, &self.device)?;
        let actions =
            matrix::<TrainingBackend>(actions, n, ACTION_DIM, &self.device).require_grad();

        // Rows are independent, so the gradient of the sum is dQ_i/da_i per row
        let q = self.model.forward(series, utility, actions.clone()).sum();
        let grads = q.backward();
        let gradient = actions
            .grad(&grads)
            .ok_or_else(|| RlError::Backend("critic produced no action gradient".to_string()))?;
        to_vec(gradient)
    }
}

/// Collects every float parameter in visiting order
#[derive(Default)]
struct ParamCollector {
    values: Vec<f32>,
}

impl<B: Backend> ModuleVisitor<B> for ParamCollector {
    fn visit_float<const D: usize>(&mut self, id: &ParamId, tensor: &Tensor<B, D>) {
        match to_vec(tensor.clone()) {
            Ok(values) => self.values.extend(values),
            Err(err) => warn!(?id, %err, "Skipping unreadable parameter"),
        }
    }
}

/// Replaces every float parameter, in visiting order, from a flat slice
struct ParamLoader<'a> {
    values: &'a [f32],
    offset: usize,
}

impl<'a> ParamLoader<'a> {
    fn new(values: &'a [f32]) -> Self {
        Self { values, offset: 0 }
    }
}

impl<B: Backend> ModuleMapper<B> for ParamLoader<'_> {
    fn map_float<const D: usize>(&mut self, _id: &ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let dims = tensor.shape().dims;
        let count: usize = dims.iter().product();
        let end = (self.offset + count).min(self.values.len());
        let chunk = self.values[self.offset..end].to_vec();
        self.offset = end;
        if chunk.len() != count {
            return tensor;
        }

        let require_grad = tensor.is_require_grad();
        Tensor::from_data(TensorData::new(chunk, dims), &tensor.device())
            .set_require_grad(require_grad)
    }
}

fn flatten<M: Module<TrainingBackend>>(model: &M) -> Vec<f32> {
    let mut collector = ParamCollector::default();
    model.visit(&mut collector);
    collector.values
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RlError::ShapeMismatch { expected, actual });
    }
    Ok(())
}

fn matrix<B: Backend>(
    values: &[f32],
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values.to_vec(), [rows, cols]), device)
}

fn state_tensors<B: Backend>(
    states: &ObservationBatch,
    series_len: usize,
    device: &B::Device,
) -> Result<(Tensor<B, 2>, Tensor<B, 2>)> {
    check_len(series_len, states.series_len)?;
    let n = states.len();
    check_len(n * series_len, states.series.len())?;
    Ok((
        matrix::<B>(&states.series, n, series_len, device),
        matrix::<B>(&states.utility, n, UTILITY_FEATURES, device),
    ))
}

fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| RlError::Backend(format!("{err:?}")))
}
