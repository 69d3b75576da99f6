use std::fmt::{Display, Formatter};

use anyhow::Result;
use ndarray::{arr1, Array1};
use rand::rngs::StdRng;
use rand::SeedableRng;

use ql::ml_model::model::ToFeatures;
use ql::prelude::{Action, Environment, ModelActionType, QlError};

use crate::config::GameConfig;
use crate::mechanics::{FlappyMechanics, GameInput};
use crate::render::GameSnapshot;

pub const STATE_FEATURES: usize = 5;

/// Normalized observation of one tick: bird height, bird velocity,
/// horizontal distance to the next pipe, gap top, gap bottom.
///
/// Always exactly 5 finite components.
#[derive(Clone, Debug, PartialEq)]
pub struct FlappyState([f32; STATE_FEATURES]);

impl FlappyState {
    pub fn values(&self) -> &[f32; STATE_FEATURES] {
        &self.0
    }
}

impl ToFeatures for FlappyState {
    fn to_features(&self) -> Array1<f32> {
        arr1(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum FlappyAction {
    None,
    Flap,
}

impl Display for FlappyAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Action for FlappyAction {
    const ACTION_SPACE: ModelActionType = 2;

    fn numeric(&self) -> ModelActionType {
        match self {
            FlappyAction::None => 0,
            FlappyAction::Flap => 1,
        }
    }

    fn try_from_numeric(value: ModelActionType) -> Result<Self> {
        match value {
            0 => Ok(FlappyAction::None),
            1 => Ok(FlappyAction::Flap),
            _ => Err(QlError(format!("value {} out of range", value)).into()),
        }
    }
}

pub struct FlappyEnvironment {
    mechanics: FlappyMechanics,
    state: FlappyState,
}

impl FlappyEnvironment {
    /// `seed` fixes the pipe randomization, making a run reproducible.
    pub fn new(cfg: GameConfig, seed: u64) -> Self {
        let mechanics = FlappyMechanics::new(cfg, StdRng::seed_from_u64(seed));
        let state = Self::encode(&mechanics);
        Self { mechanics, state }
    }

    /// Pipes passed during the current episode.
    pub fn score(&self) -> u32 {
        self.mechanics.score
    }

    /// State snapshot for an external drawing frontend.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            bird: self.mechanics.bird.clone(),
            pipes: self.mechanics.pipes.clone(),
            score: self.mechanics.score,
            done: self.mechanics.done,
        }
    }

    /// Encodes the observation from the nearest pipe (pipes stay in spawn
    /// order, so that is always the first one).
    fn encode(mechanics: &FlappyMechanics) -> FlappyState {
        let cfg = mechanics.config();
        let bird = &mechanics.bird;
        let components = match mechanics.pipes.first() {
            Some(pipe) => [
                bird.y / cfg.screen_height,
                bird.velocity / cfg.max_fall_speed,
                (pipe.x - bird.x) / cfg.screen_width,
                pipe.top / cfg.screen_height,
                pipe.bottom / cfg.screen_height,
            ],
            // no pipe on screen: unit distance, fully open gap
            None => [
                bird.y / cfg.screen_height,
                bird.velocity / cfg.max_fall_speed,
                1.0,
                0.0,
                1.0,
            ],
        };
        debug_assert!(components.iter().all(|v| v.is_finite()));
        FlappyState(components)
    }
}

impl Environment for FlappyEnvironment {
    type S = FlappyState;
    type A = FlappyAction;

    fn reset(&mut self) {
        self.mechanics.reset();
        self.state = Self::encode(&self.mechanics);
    }

    fn state(&self) -> &Self::S {
        &self.state
    }

    fn step(&mut self, action: Self::A) -> (&Self::S, f32, bool) {
        let input = GameInput {
            flap: action == FlappyAction::Flap,
        };
        let reward = self.mechanics.time_step(input);
        self.state = Self::encode(&self.mechanics);
        (&self.state, reward, self.mechanics.done)
    }
}
