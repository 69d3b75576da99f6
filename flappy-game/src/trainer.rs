use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use itertools::Itertools;
use num_format::{Locale, ToFormattedString};
use rustc_hash::FxHashMap;

use ql::learn::dqn_agent::DqnAgent;
use ql::ml_model::mlp::MlpQModel;
use ql::prelude::{Action, Environment};

use crate::config::Config;
use crate::environment::{FlappyAction, FlappyEnvironment, STATE_FEATURES};
use crate::render::RenderSink;
use crate::score_board::ScoreBoard;

/// Drives one training instance: its own environment, agent, memory and
/// checkpoint artifact. Instances share nothing, so any number of them can
/// run in parallel without synchronization.
pub struct Trainer {
    instance_id: usize,
    config: Config,
    environment: FlappyEnvironment,
    agent: DqnAgent<FlappyEnvironment, MlpQModel>,
    score_board: Arc<ScoreBoard>,
    render_sink: Box<dyn RenderSink>,
    checkpoint_file: PathBuf,
}

impl Trainer {
    pub fn new(
        instance_id: usize,
        config: Config,
        score_board: Arc<ScoreBoard>,
        render_sink: Box<dyn RenderSink>,
    ) -> Result<Self> {
        config.validate()?;

        let seed = config.training.seed.wrapping_add(instance_id as u64);
        let environment = FlappyEnvironment::new(config.game.clone(), seed);

        let mut layer_sizes = vec![STATE_FEATURES];
        layer_sizes.extend_from_slice(&config.agent.hidden_layers);
        layer_sizes.push(FlappyAction::ACTION_SPACE as usize);
        let model = MlpQModel::new(&layer_sizes, config.agent.learning_rate, seed)?;

        let agent = DqnAgent::new(config.agent.agent_parameter(), model, seed)?;

        let checkpoint_file = config
            .training
            .checkpoint_dir
            .join(format!("flappy_dqn_instance_{instance_id}.json"));

        Ok(Self {
            instance_id,
            config,
            environment,
            agent,
            score_board,
            render_sink,
            checkpoint_file,
        })
    }

    pub fn checkpoint_file(&self) -> &Path {
        &self.checkpoint_file
    }

    /// Runs the configured number of episodes, one replay per episode, then
    /// persists the learned model. A checkpoint I/O failure aborts this
    /// instance's run; sibling instances are unaffected.
    pub fn run(&mut self) -> Result<()> {
        for episode in 0..self.config.training.episodes {
            self.run_episode(episode)?;
            self.agent.replay(self.config.training.batch_size)?;
        }

        self.agent.write_checkpoint(&self.checkpoint_file).with_context(|| {
            format!(
                "instance {}: persisting checkpoint {}",
                self.instance_id,
                self.checkpoint_file.display()
            )
        })?;
        log::info!(
            "[instance {}] checkpoint written to {}",
            self.instance_id,
            self.checkpoint_file.display()
        );
        Ok(())
    }

    fn run_episode(&mut self, episode: usize) -> Result<()> {
        self.environment.reset();
        self.score_board.set_current_score(0);

        let mut state = self.environment.state().clone();
        let mut total_reward = 0.0_f32;
        let mut steps = 0_usize;
        let mut action_counts = FxHashMap::<FlappyAction, usize>::default();

        loop {
            let action = self.agent.act(&state)?;
            action_counts.entry(action).and_modify(|e| *e += 1).or_insert(1);

            let (next_state, reward, done) = {
                let (next_state, reward, done) = self.environment.step(action);
                (next_state.clone(), reward, done)
            };

            self.agent.remember(state, action, reward, next_state.clone(), done);
            state = next_state;
            total_reward += reward;
            steps += 1;

            self.score_board.set_current_score(self.environment.score() as i32);
            self.render_sink.render(&self.environment.snapshot());

            if done || steps >= self.config.training.max_steps_per_episode {
                break;
            }
        }

        let action_distribution = action_counts
            .iter()
            .map(|(action, count)| format!("{} {:.1}%", action, 100.0 * *count as f32 / steps as f32))
            .join(", ");
        log::info!(
            "[instance {}] episode {}/{}: steps: {}, score: {}, total reward: {:.2}, 𝜀={:.2}, actions: {}",
            self.instance_id,
            (episode + 1).to_formatted_string(&Locale::en),
            self.config.training.episodes.to_formatted_string(&Locale::en),
            steps,
            self.environment.score(),
            total_reward,
            self.agent.epsilon(),
            action_distribution
        );
        Ok(())
    }
}
