use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Deserialize;

use ql::learn::dqn_agent::AgentParameter;

/// Central configuration of a training run.
///
/// Resolved once at startup by the (external) configuration loader and
/// passed read-only into the environment, agent and trainer constructors.
/// The training core never mutates it. Malformed values are fatal: a run
/// refuses to start instead of training partially.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub game: GameConfig,
    pub agent: AgentConfig,
    pub training: TrainingConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.game.validate()?;
        self.agent.validate()?;
        self.training.validate()
    }
}

/// Environment constants.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub screen_width: f32,
    pub screen_height: f32,
    /// The bird's fixed horizontal position
    pub bird_x: f32,
    pub bird_len_x: f32,
    pub bird_len_y: f32,
    /// Downward acceleration per tick
    pub gravity: f32,
    /// Velocity override issued by a flap (negative = upwards)
    pub lift: f32,
    pub max_fall_speed: f32,
    pub pipe_len_x: f32,
    /// Vertical extent of the gap between a pipe pair
    pub pipe_gap: f32,
    /// Horizontal pipe movement per tick
    pub scroll_speed: f32,
    /// Bounds for the randomized gap-top position at spawn
    pub gap_top_min: f32,
    pub gap_top_max: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            screen_width: 400.0,
            screen_height: 600.0,
            bird_x: 100.0,
            bird_len_x: 50.0,
            bird_len_y: 35.0,
            gravity: 0.5,
            lift: -10.0,
            max_fall_speed: 10.0,
            pipe_len_x: 80.0,
            pipe_gap: 150.0,
            scroll_speed: 5.0,
            gap_top_min: 100.0,
            gap_top_max: 400.0,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("screen_width", self.screen_width),
            ("screen_height", self.screen_height),
            ("bird_len_x", self.bird_len_x),
            ("bird_len_y", self.bird_len_y),
            ("gravity", self.gravity),
            ("max_fall_speed", self.max_fall_speed),
            ("pipe_len_x", self.pipe_len_x),
            ("pipe_gap", self.pipe_gap),
            ("scroll_speed", self.scroll_speed),
        ] {
            if !(value.is_finite() && value > 0.0) {
                bail!("{name} must be a positive number, got {value}");
            }
        }
        if !(self.lift.is_finite() && self.lift < 0.0) {
            bail!("lift must be negative (upwards), got {}", self.lift);
        }
        if !(self.bird_x.is_finite() && self.bird_x >= 0.0 && self.bird_x < self.screen_width) {
            bail!("bird_x {} outside the screen", self.bird_x);
        }
        if !(self.gap_top_min.is_finite() && self.gap_top_max.is_finite())
            || self.gap_top_min <= 0.0
            || self.gap_top_min > self.gap_top_max
        {
            bail!(
                "gap top bounds [{}, {}] invalid",
                self.gap_top_min,
                self.gap_top_max
            );
        }
        if self.gap_top_max + self.pipe_gap >= self.screen_height {
            bail!(
                "gap_top_max {} + pipe_gap {} does not fit the screen height {}",
                self.gap_top_max,
                self.pipe_gap,
                self.screen_height
            );
        }
        Ok(())
    }
}

/// Agent hyperparameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub memory_limit: usize,
    pub gamma: f32,
    pub epsilon_max: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,
    pub learning_rate: f32,
    /// Hidden layer widths of the default MLP approximator
    pub hidden_layers: Vec<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            memory_limit: 2000,
            gamma: 0.95,
            epsilon_max: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            learning_rate: 0.001,
            hidden_layers: vec![24, 24],
        }
    }
}

impl AgentConfig {
    pub fn agent_parameter(&self) -> AgentParameter {
        AgentParameter {
            gamma: self.gamma,
            epsilon_max: self.epsilon_max,
            epsilon_min: self.epsilon_min,
            epsilon_decay: self.epsilon_decay,
            memory_limit: self.memory_limit,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.agent_parameter().validate()?;
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if self.hidden_layers.is_empty() || self.hidden_layers.contains(&0) {
            bail!("hidden_layers {:?} invalid", self.hidden_layers);
        }
        Ok(())
    }
}

/// Orchestration parameters of one run.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    pub batch_size: usize,
    /// Upper bound per episode, so a well-trained policy cannot keep an
    /// episode running forever
    pub max_steps_per_episode: usize,
    /// Number of independent training instances run in parallel
    pub instances: usize,
    pub checkpoint_dir: PathBuf,
    /// Base seed; instance i derives its own seed from it
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 500,
            batch_size: 128,
            max_steps_per_episode: 10_000,
            instances: 4,
            checkpoint_dir: PathBuf::from("."),
            seed: 0,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.episodes == 0 || self.batch_size == 0 || self.max_steps_per_episode == 0 || self.instances == 0 {
            bail!(
                "episodes, batch_size, max_steps_per_episode and instances must all be positive: {:?}",
                self
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut config = Config::default();
        config.game.gravity = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.game.lift = 10.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.game.gap_top_max = 500.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.agent.epsilon_decay = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.agent.hidden_layers = vec![];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.training.episodes = 0;
        assert!(config.validate().is_err());
    }
}
