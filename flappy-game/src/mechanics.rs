use rand::rngs::StdRng;
use rand::Rng;

use crate::config::GameConfig;

/// TOP / LEFT corner is 0/0; y grows downwards

const SURVIVAL_REWARD: f32 = 0.1;
const PIPE_PASS_REWARD: f32 = 1.0;
const TERMINAL_PENALTY: f32 = -1.0;
/// subtracted from the tick's reward on ceiling contact
const CEILING_BRUSH_PENALTY: f32 = 0.1;

#[derive(Copy, Clone)]
pub struct GameInput {
    pub flap: bool,
}

impl GameInput {
    pub fn none() -> Self {
        Self { flap: false }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bird {
    pub x: f32,
    pub y: f32,
    pub velocity: f32,
}

impl Bird {
    fn flap(&mut self, cfg: &GameConfig) {
        self.velocity = cfg.lift;
    }

    /// One gravity integration step. The velocity clamp applies after the
    /// position update; position is clamped to the screen, zeroing velocity.
    fn integrate(&mut self, cfg: &GameConfig) {
        self.velocity += cfg.gravity;
        self.y += self.velocity;
        self.velocity = f32::min(self.velocity, cfg.max_fall_speed);

        if self.y <= 0.0 {
            self.y = 0.0;
            self.velocity = 0.0;
        }
        let floor_y = cfg.screen_height - cfg.bird_len_y;
        if self.y >= floor_y {
            self.y = floor_y;
            self.velocity = 0.0;
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pipe {
    pub x: f32,
    /// upper edge of the gap
    pub top: f32,
    /// lower edge of the gap; bottom = top + gap height
    pub bottom: f32,
    /// set exactly once, when the bird's leading edge passes the pipe
    pub scored: bool,
}

impl Pipe {
    fn spawn(cfg: &GameConfig, rng: &mut StdRng) -> Self {
        let top = rng.gen_range(cfg.gap_top_min..=cfg.gap_top_max);
        Self {
            x: cfg.screen_width,
            top,
            bottom: top + cfg.pipe_gap,
            scored: false,
        }
    }

    fn advance(&mut self, cfg: &GameConfig) {
        self.x -= cfg.scroll_speed;
    }

    fn off_screen(&self, cfg: &GameConfig) -> bool {
        self.x < -cfg.pipe_len_x
    }
}

#[derive(Debug)]
pub struct FlappyMechanics {
    cfg: GameConfig,
    rng: StdRng,
    pub bird: Bird,
    pub pipes: Vec<Pipe>,
    pub score: u32,
    pub done: bool,
}

impl FlappyMechanics {
    pub fn new(cfg: GameConfig, mut rng: StdRng) -> Self {
        let bird = Self::initial_bird(&cfg);
        let pipes = vec![Pipe::spawn(&cfg, &mut rng)];
        Self {
            cfg,
            rng,
            bird,
            pipes,
            score: 0,
            done: false,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.cfg
    }

    fn initial_bird(cfg: &GameConfig) -> Bird {
        Bird {
            x: cfg.bird_x,
            y: cfg.screen_height / 2.0,
            velocity: 0.0,
        }
    }

    /// Starts a fresh episode: bird at mid-screen with zero velocity, one
    /// freshly spawned pipe at the right edge, score 0.
    pub fn reset(&mut self) {
        self.bird = Self::initial_bird(&self.cfg);
        self.pipes = vec![Pipe::spawn(&self.cfg, &mut self.rng)];
        self.score = 0;
        self.done = false;
    }

    /// Physically move one time step forward.
    ///
    /// Returns the immediate reward earned during the tick; `done` is set on
    /// pipe collision or floor contact. Ceiling contact only penalizes and
    /// clamps - the episode goes on.
    pub fn time_step(&mut self, input: GameInput) -> f32 {
        if input.flap {
            self.bird.flap(&self.cfg);
        }
        self.bird.integrate(&self.cfg);

        let mut reward = SURVIVAL_REWARD;

        for pipe in &mut self.pipes {
            pipe.advance(&self.cfg);
        }
        for pipe in &mut self.pipes {
            if !pipe.scored && self.bird.x > pipe.x + self.cfg.pipe_len_x {
                pipe.scored = true;
                self.score += 1;
                reward = PIPE_PASS_REWARD;
            }
        }

        // removal-and-append discipline: every pipe scrolled fully off-screen
        // is replaced within the same tick, so the live pipe count is
        // invariant across the step
        let count = self.pipes.len();
        let cfg = &self.cfg;
        self.pipes.retain(|pipe| !pipe.off_screen(cfg));
        for _ in self.pipes.len()..count {
            self.pipes.push(Pipe::spawn(&self.cfg, &mut self.rng));
        }

        for pipe in &self.pipes {
            if self.bird_collides_with(pipe) {
                reward = TERMINAL_PENALTY;
                self.done = true;
            }
        }

        if self.bird.y >= self.cfg.screen_height - self.cfg.bird_len_y {
            reward = TERMINAL_PENALTY;
            self.done = true;
        }
        if self.bird.y <= 0.0 {
            reward -= CEILING_BRUSH_PENALTY;
            self.bird.y = 0.0;
            self.bird.velocity = 0.0;
        }

        reward
    }

    /// Horizontal extents overlap and the bird's vertical span leaves the gap.
    fn bird_collides_with(&self, pipe: &Pipe) -> bool {
        self.bird.x + self.cfg.bird_len_x > pipe.x
            && self.bird.x < pipe.x + self.cfg.pipe_len_x
            && (self.bird.y < pipe.top || self.bird.y + self.cfg.bird_len_y > pipe.bottom)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rstest::rstest;

    use super::*;

    fn mechanics() -> FlappyMechanics {
        FlappyMechanics::new(GameConfig::default(), StdRng::seed_from_u64(7))
    }

    fn mechanics_with_pipe(pipe: Pipe) -> FlappyMechanics {
        let mut m = mechanics();
        m.pipes = vec![pipe];
        m
    }

    #[test]
    fn no_flap_trajectory_is_deterministic() {
        // pure gravity fall from mid-screen: velocity ramps by 0.5 per tick
        // up to the fall speed cap, floor contact ends the episode on tick 36
        let mut m = mechanics();
        assert_eq!(m.bird.y, 300.0);

        let reward = m.time_step(GameInput::none());
        assert_eq!(m.bird.y, 300.5);
        assert_eq!(m.bird.velocity, 0.5);
        assert_eq!(reward, 0.1);

        m.time_step(GameInput::none());
        assert_eq!(m.bird.y, 301.5);

        for tick in 3..=35 {
            let reward = m.time_step(GameInput::none());
            assert!(!m.done, "episode ended early at tick {tick}");
            assert_eq!(reward, 0.1);
        }

        let reward = m.time_step(GameInput::none());
        assert!(m.done);
        assert_eq!(reward, -1.0);
        assert_eq!(m.bird.y, 565.0);
        assert_eq!(m.score, 0);
    }

    #[test]
    fn flap_overrides_velocity_with_lift() {
        let mut m = mechanics();
        m.bird.velocity = 8.0;

        m.time_step(GameInput { flap: true });

        // lift -10, one gravity tick on top
        assert_eq!(m.bird.velocity, -9.5);
        assert_eq!(m.bird.y, 290.5);
    }

    #[rstest]
    // bird span stays inside the gap: survives with the survival bonus
    #[case(250.0, 0.1, false)]
    // bird top edge above the gap
    #[case(150.0, -1.0, true)]
    // bird bottom edge below the gap
    #[case(340.0, -1.0, true)]
    fn collision_depends_on_gap_position(#[case] bird_y: f32, #[case] expected_reward: f32, #[case] expected_done: bool) {
        let mut m = mechanics_with_pipe(Pipe {
            x: 110.0,
            top: 200.0,
            bottom: 350.0,
            scored: false,
        });
        m.bird.y = bird_y;
        m.bird.velocity = 0.0;

        let reward = m.time_step(GameInput::none());

        assert_eq!(m.done, expected_done);
        assert_eq!(reward, expected_reward);
    }

    #[test]
    fn passing_a_pipe_scores_exactly_once() {
        let mut m = mechanics_with_pipe(Pipe {
            x: 21.0,
            top: 100.0,
            bottom: 250.0,
            scored: false,
        });
        m.bird.y = 300.0;
        m.bird.velocity = 0.0;

        // pipe advances to x=16; bird.x=100 > 16 + 80
        let reward = m.time_step(GameInput::none());
        assert_eq!(m.score, 1);
        assert_eq!(reward, 1.0);
        assert!(m.pipes[0].scored);

        // further ticks leave the score untouched
        let reward = m.time_step(GameInput::none());
        assert_eq!(m.score, 1);
        assert_eq!(reward, 0.1);
    }

    #[test]
    fn off_screen_pipe_is_recycled_within_the_same_tick() {
        let mut m = mechanics_with_pipe(Pipe {
            x: -76.0,
            top: 100.0,
            bottom: 250.0,
            scored: true,
        });
        m.bird.y = 300.0;
        m.bird.velocity = 0.0;

        m.time_step(GameInput::none());

        assert_eq!(m.pipes.len(), 1);
        assert_eq!(m.pipes[0].x, 400.0);
        assert!(!m.pipes[0].scored);
        assert!(m.pipes[0].top < m.pipes[0].bottom);
    }

    #[test]
    fn ceiling_contact_penalizes_but_does_not_terminate() {
        let mut m = mechanics();
        m.bird.y = 2.0;
        m.bird.velocity = 0.0;

        let reward = m.time_step(GameInput { flap: true });

        assert!(!m.done);
        assert_eq!(reward, 0.0);
        assert_eq!(m.bird.y, 0.0);
        assert_eq!(m.bird.velocity, 0.0);
    }

    #[test]
    fn spawned_pipes_respect_configured_gap_bounds() {
        let cfg = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..200 {
            let pipe = Pipe::spawn(&cfg, &mut rng);
            assert!(pipe.x == cfg.screen_width);
            assert!(pipe.top >= cfg.gap_top_min && pipe.top <= cfg.gap_top_max);
            assert_eq!(pipe.bottom, pipe.top + cfg.pipe_gap);
            assert!(!pipe.scored);
        }
    }
}
