use std::path::Path;

use anyhow::Result;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::learn::replay_memory::{ReplayMemory, Transition};
use crate::ml_model::model::{QFunctionModel, ToFeatures};
use crate::prelude::{Action, Environment, ModelActionType, QlError};

/// Agent hyperparameters.
pub struct AgentParameter {
    /// Discount factor; (0 <= 𝛾 <= 1) weight of the bootstrapped future value.
    /// The bigger, the more farsighted the agent becomes
    pub gamma: f32,
    /// Initial epsilon greedy parameter
    pub epsilon_max: f64,
    /// Floor of the epsilon greedy parameter
    pub epsilon_min: f64,
    /// Multiplicative epsilon decay, applied once per completed replay call
    pub epsilon_decay: f64,
    /// Experience memory capacity
    pub memory_limit: usize,
}

impl Default for AgentParameter {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            epsilon_max: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            memory_limit: 2000,
        }
    }
}

impl AgentParameter {
    pub fn validate(&self) -> Result<()> {
        if !(self.gamma.is_finite() && (0.0..=1.0).contains(&self.gamma)) {
            return Err(QlError(format!("gamma {} out of range [0, 1]", self.gamma)).into());
        }
        if !(0.0..=1.0).contains(&self.epsilon_min)
            || !(0.0..=1.0).contains(&self.epsilon_max)
            || self.epsilon_min > self.epsilon_max
        {
            return Err(QlError(format!(
                "epsilon bounds [{}, {}] invalid",
                self.epsilon_min, self.epsilon_max
            ))
            .into());
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay < 1.0) {
            return Err(QlError(format!("epsilon decay {} out of range (0, 1)", self.epsilon_decay)).into());
        }
        if self.memory_limit == 0 {
            return Err(QlError::from("memory limit must be positive").into());
        }
        Ok(())
    }
}

/// Value-based learning agent: epsilon-greedy action selection over a
/// Q-function approximator, backed by a bounded FIFO experience memory.
pub struct DqnAgent<E, M>
where
    E: Environment,
    E::S: ToFeatures,
    M: QFunctionModel,
{
    param: AgentParameter,
    memory: ReplayMemory<E::S, E::A>,
    model: M,
    rng: StdRng,
    /// Epsilon greedy parameter
    epsilon: f64,
}

impl<E, M> DqnAgent<E, M>
where
    E: Environment,
    E::S: ToFeatures,
    M: QFunctionModel,
{
    pub fn new(param: AgentParameter, model: M, seed: u64) -> Result<Self> {
        param.validate()?;
        let memory = ReplayMemory::new(param.memory_limit);
        let epsilon = param.epsilon_max;
        Ok(Self {
            param,
            memory,
            model,
            rng: StdRng::seed_from_u64(seed),
            epsilon,
        })
    }

    /// Current exploration rate. Non-increasing over the agent's lifetime,
    /// never below `epsilon_min`.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Epsilon-greedy action selection: with probability epsilon a uniformly
    /// random action, otherwise the action with the highest predicted
    /// Q-value (ties break toward the first-encountered maximum).
    pub fn act(&mut self, state: &E::S) -> Result<E::A> {
        if self.rng.gen::<f64>() < self.epsilon {
            let action = self.rng.gen_range(0..E::A::ACTION_SPACE);
            log::trace!("explore: random action {action}");
            return E::A::try_from_numeric(action);
        }

        let q_values = self.model.predict(&state.to_features());
        let action = argmax(&q_values);
        log::trace!("exploit: best action {action}, q-values {q_values}");
        E::A::try_from_numeric(action)
    }

    /// Records one transition. Always succeeds; once the memory is at
    /// capacity the oldest transition is evicted first.
    pub fn remember(&mut self, state: E::S, action: E::A, reward: f32, next_state: E::S, done: bool) {
        self.memory.add(Transition {
            state,
            action,
            reward,
            next_state,
            done,
        });
    }

    /// Trains the model on `batch_size` transitions sampled uniformly
    /// without replacement, then decays the exploration rate.
    ///
    /// A call while the memory holds fewer than `batch_size` transitions is
    /// a documented no-op: memory, epsilon and model stay untouched.
    ///
    /// Targets are online (sequential): every fit is applied before the next
    /// transition's bootstrap value is computed within the same call.
    pub fn replay(&mut self, batch_size: usize) -> Result<()> {
        if self.memory.len() < batch_size {
            return Ok(());
        }

        for index in self.memory.sample_indices(&mut self.rng, batch_size) {
            let (features, action, reward, next_features, done) = {
                let transition = self.memory.get(index);
                (
                    transition.state.to_features(),
                    transition.action,
                    transition.reward,
                    transition.next_state.to_features(),
                    transition.done,
                )
            };

            // Q value = reward + discount factor * expected future reward;
            // for terminal transitions the target is exactly the reward
            let mut target = reward;
            if !done {
                let future = self.model.predict(&next_features);
                target += self.param.gamma * max_value(&future);
            }

            let mut target_values = self.model.predict(&features);
            target_values[action.numeric() as usize] = target;
            self.model.fit(&features, &target_values)?;
        }

        // clip after multiply: the rate never decays below the floor
        self.epsilon = f64::max(self.param.epsilon_min, self.epsilon * self.param.epsilon_decay);
        Ok(())
    }

    pub fn write_checkpoint(&self, file: &Path) -> Result<()> {
        self.model.write_checkpoint(file)
    }

    pub fn read_checkpoint(&mut self, file: &Path) -> Result<()> {
        self.model.read_checkpoint(file)
    }
}

fn argmax(values: &Array1<f32>) -> ModelActionType {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate() {
        if value > values[best] {
            best = i;
        }
    }
    best as ModelActionType
}

fn max_value(values: &Array1<f32>) -> f32 {
    values.iter().fold(f32::NEG_INFINITY, |max, &v| f32::max(max, v))
}
